/// Primitive numbers that can back a receive buffer.
pub trait Align1: bytemuck::Pod {}

impl Align1 for u8 {}
impl Align1 for u32 {}
impl Align1 for u64 {}
impl Align1 for f32 {}
impl Align1 for f64 {}

/// Receive buffer element types aligned to at least 4 bytes, so `f32` payloads
/// can be viewed in place.
pub trait Align4: Align1 {}

impl Align4 for u32 {}
impl Align4 for u64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}
