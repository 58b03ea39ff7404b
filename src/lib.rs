pub mod format;
pub mod error;
pub mod encode;
pub mod decode;
pub mod archive;

pub use format::{Header, MAGIC};
pub use error::{DecodeError, EncodeError, TruncatedAt};
pub use encode::{encode, encode_buffers, ContainerWriter};
pub use decode::{decode, ContainerReader, DecodeLimits, Entry};
