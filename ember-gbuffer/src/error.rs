use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("parameter '{name}' is declared with different formats in different lighting models")]
    ConflictingFormat { name: String },
    #[error("no supported color format covers component type {component_type:?} at {component_count} channels")]
    UnsupportedFormat { component_type: crate::packer::ComponentType, component_count: u8 },
    #[error("component '{name}' already exists in another texture")]
    DuplicateComponent { name: String },
    #[error("generated shader library '{library}' failed to parse: {source}")]
    LibraryParse { library: String, #[source] source: ember_shader::error::ParseError },
}
