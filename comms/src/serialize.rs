use std::io;

/// A type that can write itself into a frame.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to append the serialized header bytes to.
    ///
    /// # Returns
    /// An optional slice of bytes that must be sent right after `buf` without being copied,
    /// or an `io::Error` if the value could not be serialized.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
