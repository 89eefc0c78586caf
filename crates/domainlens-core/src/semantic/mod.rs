pub mod chunks;
pub mod index;
pub mod scorer;
pub mod tagger;
pub mod workflows;
