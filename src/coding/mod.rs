// src/coding/mod.rs

pub mod boxing;
pub mod encoder;
pub mod resolver;
pub mod skip;

pub use boxing::{
    DataEncodingStrategy, DateEncodingStrategy, EncoderOptions, NonConformingFloatStrategy,
    SingleValueEncoder,
};
pub use encoder::{EncodeMode, Encoded, ParseEncoder};
pub use resolver::{ContentHash, SavedIndex};
pub use skip::SkipKeys;
