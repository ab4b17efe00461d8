//! Packs lighting-model parameters into a minimal set of G-Buffer textures
//! and emits the shader libraries that write and read them. Grounded in
//! `Atema::Graphics::GBuffer`/`GBufferBuilder`.

pub mod error;
pub mod packer;
pub mod shader;

pub use error::PackError;
pub use packer::{
    Component, ComponentType, GBuffer, GBufferTexture, LightingModel, LightingModelParameter, TextureBinding,
};

use std::collections::HashMap;

/// Pack `models` into a [`GBuffer`] and generate every shader library its
/// consumers need, validating each one by parsing it.
pub fn build_gbuffer(models: &[LightingModel]) -> Result<(GBuffer, HashMap<String, String>), PackError> {
    let gbuffer = packer::pack(models)?;
    let libraries = shader::generate_libraries(&gbuffer)?;
    Ok((gbuffer, libraries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_gbuffer_and_its_libraries_for_two_lighting_models() {
        let models = vec![
            LightingModel {
                name: "Standard".to_string(),
                parameters: vec![
                    LightingModelParameter { name: "albedo".to_string(), component_type: ComponentType::Unorm8, component_count: 3 },
                    LightingModelParameter { name: "metallic".to_string(), component_type: ComponentType::Unorm8, component_count: 1 },
                ],
            },
            LightingModel {
                name: "ClearCoat".to_string(),
                parameters: vec![
                    LightingModelParameter { name: "albedo".to_string(), component_type: ComponentType::Unorm8, component_count: 3 },
                    LightingModelParameter { name: "coat_weight".to_string(), component_type: ComponentType::Unorm8, component_count: 1 },
                ],
            },
        ];
        let (gbuffer, libraries) = build_gbuffer(&models).unwrap();
        assert!(gbuffer.is_compatible(&models[0]));
        assert!(gbuffer.is_compatible(&models[1]));
        assert!(libraries.contains_key("Atema.GBufferWrite"));
        assert!(libraries.contains_key("Atema.GBufferRead"));

        let bindings = gbuffer.texture_bindings(&["albedo".to_string(), "metallic".to_string(), "coat_weight".to_string()]);
        assert!(!bindings.is_empty());
    }
}
