//! Shader-library emission for a packed [`GBuffer`]: one write/read snippet
//! per texture, one alias snippet per component, and two umbrella libraries
//! that `include` every alias. Grounded in `GBuffer.cpp`'s
//! `generateShaderLibraries`, translated to this crate's shader grammar.
//!
//! Every generated snippet is parsed with [`ember_shader::parse`] before
//! being handed back, so a name that isn't a legal shader identifier fails
//! here instead of producing silently broken GLSL later.

use std::collections::HashMap;

use crate::error::PackError;
use crate::packer::{read_option_name, Component, GBuffer, GBufferTexture};

const WRITE_LIB: &str = "Atema.GBufferWrite";
const READ_LIB: &str = "Atema.GBufferRead";

const WRITE_OPTIONS_LIB: &str = "option\n{\n\tint GBufferWriteLocation = 0;\n}";
const READ_OPTIONS_LIB: &str = "option\n{\n\tint GBufferReadSet = 0;\n\tint GBufferReadBinding = 0;\n}";

fn type_str(component_count: u8) -> String {
    if component_count > 1 {
        format!("vec{component_count}f")
    } else {
        "float".to_string()
    }
}

fn channel_letters(start_channel: u32, count: u8) -> String {
    "xyzw".chars().skip(start_channel as usize).take(count as usize).collect()
}

fn texture_write_shader(binding_offset: u32, texture: &GBufferTexture) -> String {
    let used_channels = texture.components.iter().take_while(|slot| !slot.is_empty()).count().max(1);
    let ty = type_str(used_channels as u8);
    format!(
        "include {WRITE_LIB}.Options;\n[stage(fragment)]\noutput\n{{\t[location(GBufferWriteLocation + {binding_offset})] {ty} {name};\n}}",
        name = texture.name,
    )
}

fn texture_read_shader(binding_offset: u32, texture: &GBufferTexture) -> String {
    let option_name = read_option_name(&texture.name);
    format!(
        "include {READ_LIB}.Options;\noption\n{{\n\tint {option_name} = {binding_offset};\n}}\nexternal\n{{\n\t[set(GBufferReadSet), binding(GBufferReadBinding + {option_name})] sampler2Df {name};\n}}",
        name = texture.name,
    )
}

fn alias_write_shader(texture_name: &str, channel: u32, component: &Component) -> String {
    let ty = type_str(component.size);
    let channels = channel_letters(channel, component.size);
    format!(
        "include {WRITE_LIB}.{texture_name};\nvoid GBufferWrite{name}({ty} value)\n{{\n\t{texture_name}.{channels} = value;\n}}",
        name = component.name,
    )
}

fn alias_read_shader(texture_name: &str, channel: u32, component: &Component) -> String {
    let ty = type_str(component.size);
    let channels = channel_letters(channel, component.size);
    format!(
        "include {READ_LIB}.{texture_name};\n{ty} GBufferRead{name}(vec2f uv)\n{{\n\treturn sample({texture_name}, uv).{channels};\n}}",
        name = component.name,
    )
}

/// Generate and validate every shader library a packed [`GBuffer`] needs.
/// The umbrella `Atema.GBufferWrite` / `Atema.GBufferRead` libraries each
/// `include` every per-component alias, so a consumer can pull in the whole
/// G-Buffer or a single named component.
pub fn generate_libraries(gbuffer: &GBuffer) -> Result<HashMap<String, String>, PackError> {
    let mut libraries = HashMap::new();
    libraries.insert(format!("{WRITE_LIB}.Options"), WRITE_OPTIONS_LIB.to_string());
    libraries.insert(format!("{READ_LIB}.Options"), READ_OPTIONS_LIB.to_string());

    let mut write_umbrella = String::new();
    let mut read_umbrella = String::new();

    for (binding_offset, texture) in gbuffer.textures.iter().enumerate() {
        let binding_offset = binding_offset as u32;
        libraries.insert(format!("{WRITE_LIB}.{}", texture.name), texture_write_shader(binding_offset, texture));
        libraries.insert(format!("{READ_LIB}.{}", texture.name), texture_read_shader(binding_offset, texture));

        for (channel, components) in texture.components.iter().enumerate() {
            for component in components {
                let write_name = format!("{WRITE_LIB}.{}", component.name);
                let read_name = format!("{READ_LIB}.{}", component.name);
                libraries.insert(write_name.clone(), alias_write_shader(&texture.name, channel as u32, component));
                libraries.insert(read_name.clone(), alias_read_shader(&texture.name, channel as u32, component));
                write_umbrella.push_str(&format!("include {write_name};\n"));
                read_umbrella.push_str(&format!("include {read_name};\n"));
            }
        }
    }
    libraries.insert(WRITE_LIB.to_string(), write_umbrella);
    libraries.insert(READ_LIB.to_string(), read_umbrella);

    for (name, source) in &libraries {
        ember_shader::parse(source).map_err(|source| PackError::LibraryParse { library: name.clone(), source })?;
    }

    Ok(libraries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::{pack, ComponentType, LightingModel, LightingModelParameter};

    #[test]
    fn generates_and_parses_every_library_for_a_packed_gbuffer() {
        let model = LightingModel {
            name: "Standard".to_string(),
            parameters: vec![
                LightingModelParameter { name: "albedo".to_string(), component_type: ComponentType::Unorm8, component_count: 3 },
                LightingModelParameter { name: "metallic".to_string(), component_type: ComponentType::Unorm8, component_count: 1 },
            ],
        };
        let gbuffer = pack(&[model]).unwrap();
        let libraries = generate_libraries(&gbuffer).unwrap();
        assert!(libraries.contains_key(&format!("{WRITE_LIB}.albedo")));
        assert!(libraries.contains_key(&format!("{READ_LIB}.albedo")));
        assert!(libraries[WRITE_LIB].contains("include Atema.GBufferWrite.albedo;"));
    }
}
