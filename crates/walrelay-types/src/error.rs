/// Errors produced by the foundation types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A bulk-load descriptor payload could not be decoded.
    #[error("malformed bulk-load descriptor: {0}")]
    MalformedDescriptor(String),

    /// A descriptor payload could not be encoded.
    #[error("descriptor encoding failed: {0}")]
    DescriptorEncoding(String),
}
