//! Schema, record values and the record encoder contract.
//!
//! The feed core only depends on `RecordEncoder`; `JsonEntryEncoder` is the encoder
//! shipped with the crate for entity-set feeds.

pub mod types;
pub mod encoder;

pub use types::{
    Annotation,
    ComplexType,
    ComplexValue,
    EntityType,
    EnumType,
    Model,
    ModelBuilder,
    ModelError,
    Property,
    PropertyDef,
    PropertyKind,
    Record,
    Value,
};

pub use encoder::{
    EncodeError,
    EncodeErrorKind,
    EncodeFailure,
    JsonEntryEncoder,
    RecordEncoder,
};
