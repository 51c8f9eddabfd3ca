#[cfg(feature = "serde")]
pub(crate) mod serde;
