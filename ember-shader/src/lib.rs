//! Shader AST, constant folding, preprocessing, stage extraction, a GLSL
//! back-end writer and a native writer back to this crate's own grammar,
//! tying together the language the frame graph and G-Buffer packer use to
//! describe their shading code.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod preprocessor;
mod parser;
pub mod stage_extractor;
pub mod writer;

use std::collections::HashMap;

use ast::{ConstantValue, Statement};
use error::ParseError;
use preprocessor::LibraryResolver;
use writer::GlslSettings;

/// Parse shader source into a root [`Statement::Sequence`] of top-level declarations.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    parser::parse(source)
}

/// Parse, preprocess and stage-extract `source`, returning GLSL for `stage`.
///
/// `options` overrides option defaults declared in the source; `libraries`
/// resolves `include` statements encountered during preprocessing.
pub fn compile_stage(
    source: &str,
    stage: &str,
    options: &HashMap<String, ConstantValue>,
    libraries: &dyn LibraryResolver,
    settings: &GlslSettings,
) -> Result<String, ParseError> {
    log::debug!("compiling stage '{stage}' ({} option override(s))", options.len());
    let parsed = parse(source)?;
    let top_level = match parsed {
        Statement::Sequence(statements) => statements,
        other => vec![other],
    };
    let preprocessed = preprocessor::preprocess(&top_level, options, libraries);
    let extracted = stage_extractor::extract_stage(&preprocessed, stage);
    log::trace!("stage '{stage}' retained {} top-level declaration(s) after extraction", extracted.len());
    Ok(writer::write_stage(&extracted, stage, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use preprocessor::NoLibraries;

    #[test]
    fn compiles_minimal_vertex_stage_to_glsl() {
        let source = "\
option { int unused = 1; }
input { [location(0)] vec3f position; }
[entry(vertex)]
void main() {
    set_vertex_position(vec4f(position.x, position.y, position.z, 1.0));
}
";
        let glsl = compile_stage(source, "vertex", &HashMap::new(), &NoLibraries, &GlslSettings::default()).unwrap();
        assert!(glsl.contains("#version"));
        assert!(glsl.contains("void main()"));
        assert!(glsl.contains("gl_Position ="));
    }
}
