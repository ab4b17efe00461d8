//! Bin-packs lighting-model parameters into a minimal set of G-Buffer
//! textures. Grounded in `GBuffer.cpp`'s `GBufferBuilder`: parameters are
//! grouped by component type, sorted by descending size then name, and
//! placed greedily into the physical texture that leaves the least slack.

use std::collections::HashMap;

use ember_rhi::TextureFormat;

use crate::error::PackError;

const SLOT_COUNT: usize = 4;

/// The component storage kind a parameter occupies. Deliberately limited to
/// the families `ember-rhi`'s `TextureFormat` actually models; a parameter
/// asking for something else has no representable physical format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Unorm8,
    Sfloat16,
    Sfloat32,
}

#[derive(Debug, Clone)]
pub struct LightingModelParameter {
    pub name: String,
    pub component_type: ComponentType,
    pub component_count: u8,
}

#[derive(Debug, Clone)]
pub struct LightingModel {
    pub name: String,
    pub parameters: Vec<LightingModelParameter>,
}

/// One parameter's slice of a [`GBufferTexture`]'s channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub size: u8,
}

#[derive(Debug, Clone)]
pub struct GBufferTexture {
    pub name: String,
    pub format: TextureFormat,
    pub component_type: ComponentType,
    /// Per-channel list of components occupying that channel (a component of
    /// size N appears in N consecutive slots).
    pub components: [Vec<Component>; SLOT_COUNT],
}

#[derive(Debug, Default)]
pub struct GBuffer {
    pub textures: Vec<GBufferTexture>,
    component_to_texture: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub texture_index: usize,
    pub binding_option_name: String,
}

impl GBuffer {
    pub fn texture_for_component(&self, name: &str) -> Option<&GBufferTexture> {
        self.component_to_texture.get(name).map(|&i| &self.textures[i])
    }

    /// True if every parameter of `model` maps to an existing component of
    /// the same type and size in this G-Buffer.
    pub fn is_compatible(&self, model: &LightingModel) -> bool {
        model.parameters.iter().all(|param| match self.texture_for_component(&param.name) {
            Some(texture) => {
                texture.component_type == param.component_type
                    && texture.components.iter().flatten().any(|c| c.name == param.name && c.size == param.component_count)
            }
            None => false,
        })
    }

    /// Texture bindings needed to read every named component, deduplicated
    /// and ordered by texture index.
    pub fn texture_bindings(&self, component_names: &[String]) -> Vec<TextureBinding> {
        let mut indices: Vec<usize> =
            component_names.iter().filter_map(|name| self.component_to_texture.get(name).copied()).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|index| TextureBinding { texture_index: index, binding_option_name: read_option_name(&self.textures[index].name) })
            .collect()
    }
}

pub(crate) fn read_option_name(texture_name: &str) -> String {
    format!("GBufferRead{texture_name}Offset")
}

struct BuildTexture {
    name: String,
    component_type: ComponentType,
    component_count: u8,
    dependencies: std::collections::HashSet<String>,
}

struct PhysicalTexture {
    slots: [Vec<String>; SLOT_COUNT],
    components: [Vec<Component>; SLOT_COUNT],
}

impl PhysicalTexture {
    fn new() -> Self {
        PhysicalTexture { slots: [Vec::new(), Vec::new(), Vec::new(), Vec::new()], components: [Vec::new(), Vec::new(), Vec::new(), Vec::new()] }
    }

    /// Smallest starting index at which `count` consecutive channels contain
    /// no dependency of the texture being placed, or `None` if it never fits.
    fn find_fit(&self, count: u8, dependencies: &std::collections::HashSet<String>) -> Option<usize> {
        let count = count as usize;
        let mut index = 0usize;
        while index + count <= SLOT_COUNT {
            let mut dependency_index = None;
            'search: for offset in 0..count {
                for existing in &self.slots[index + offset] {
                    if dependencies.contains(existing) {
                        dependency_index = Some(index + offset);
                        break 'search;
                    }
                }
            }
            match dependency_index {
                Some(found_at) => index = found_at + 1,
                None => return Some(index),
            }
        }
        None
    }

    fn place(&mut self, name: &str, count: u8, index: usize) {
        for offset in 0..count as usize {
            self.slots[index + offset].push(name.to_string());
        }
        self.components[index].push(Component { name: name.to_string(), size: count });
    }

    /// Number of leading channels that are occupied, scanning from slot 0
    /// and stopping at the first empty one.
    fn used_channel_count(&self) -> u8 {
        self.slots.iter().take_while(|s| !s.is_empty()).count() as u8
    }
}

fn resolve_format(component_type: ComponentType, mut channel_count: u8) -> Result<TextureFormat, PackError> {
    loop {
        let candidate = match (component_type, channel_count) {
            (ComponentType::Unorm8, 1..=4) => Some(TextureFormat::Rgba8Unorm),
            (ComponentType::Sfloat16, 1) => Some(TextureFormat::R16Float),
            (ComponentType::Sfloat16, 2..=4) => Some(TextureFormat::Rgba16Float),
            (ComponentType::Sfloat32, 1) => Some(TextureFormat::R32Float),
            (ComponentType::Sfloat32, 2..=4) => Some(TextureFormat::Rgba32Float),
            _ => None,
        };
        if let Some(format) = candidate {
            return Ok(format);
        }
        if channel_count >= SLOT_COUNT as u8 {
            return Err(PackError::UnsupportedFormat { component_type, component_count: channel_count });
        }
        channel_count += 1;
    }
}

/// Pack every distinct parameter across `models` into a minimal set of
/// G-Buffer textures.
pub fn pack(models: &[LightingModel]) -> Result<GBuffer, PackError> {
    log::debug!("packing {} lighting model(s)", models.len());
    let mut textures: HashMap<String, BuildTexture> = HashMap::new();

    for model in models {
        for param in &model.parameters {
            match textures.get(&param.name) {
                Some(existing) if existing.component_type != param.component_type || existing.component_count != param.component_count => {
                    return Err(PackError::ConflictingFormat { name: param.name.clone() });
                }
                Some(_) => {}
                None => {
                    textures.insert(
                        param.name.clone(),
                        BuildTexture {
                            name: param.name.clone(),
                            component_type: param.component_type,
                            component_count: param.component_count,
                            dependencies: std::collections::HashSet::new(),
                        },
                    );
                }
            }
        }
        for param in &model.parameters {
            let deps: Vec<String> = model.parameters.iter().filter(|p| p.name != param.name).map(|p| p.name.clone()).collect();
            textures.get_mut(&param.name).unwrap().dependencies.extend(deps);
        }
    }

    let mut by_type: HashMap<ComponentType, Vec<&BuildTexture>> = HashMap::new();
    for tex in textures.values() {
        by_type.entry(tex.component_type).or_default().push(tex);
    }

    let mut sorted_types: Vec<ComponentType> = by_type.keys().copied().collect();
    sorted_types.sort();

    let mut physical_textures: Vec<(ComponentType, Vec<PhysicalTexture>)> = Vec::new();

    for component_type in sorted_types {
        let mut group = by_type.remove(&component_type).unwrap();
        group.sort_by(|a, b| b.component_count.cmp(&a.component_count).then_with(|| a.name.cmp(&b.name)));

        let mut pts: Vec<PhysicalTexture> = Vec::new();
        for tex in group {
            let mut best: Option<(usize, usize)> = None; // (pt_index, slot_index)
            let mut best_remaining = SLOT_COUNT + 1;
            for (pt_index, pt) in pts.iter().enumerate() {
                if let Some(slot) = pt.find_fit(tex.component_count, &tex.dependencies) {
                    let remaining = SLOT_COUNT - slot - tex.component_count as usize;
                    if remaining < best_remaining {
                        best = Some((pt_index, slot));
                        best_remaining = remaining;
                    }
                }
            }
            match best {
                Some((pt_index, slot)) => pts[pt_index].place(&tex.name, tex.component_count, slot),
                None => {
                    let mut pt = PhysicalTexture::new();
                    pt.place(&tex.name, tex.component_count, 0);
                    pts.push(pt);
                }
            }
        }
        physical_textures.push((component_type, pts));
    }

    let mut gbuffer = GBuffer::default();
    let mut texture_index = 0usize;
    for (component_type, pts) in physical_textures {
        for pt in pts {
            let used = pt.used_channel_count().max(1);
            let format = resolve_format(component_type, used)?;
            let name = format!("GBufferTexture{texture_index}_{component_type:?}");
            texture_index += 1;

            for components in &pt.components {
                for component in components {
                    if gbuffer.component_to_texture.contains_key(&component.name) {
                        return Err(PackError::DuplicateComponent { name: component.name.clone() });
                    }
                }
            }
            let index = gbuffer.textures.len();
            for components in &pt.components {
                for component in components {
                    gbuffer.component_to_texture.insert(component.name.clone(), index);
                }
            }
            gbuffer.textures.push(GBufferTexture { name, format, component_type, components: pt.components });
        }
    }

    log::debug!("packed into {} physical texture(s)", gbuffer.textures.len());
    Ok(gbuffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: ComponentType, count: u8) -> LightingModelParameter {
        LightingModelParameter { name: name.to_string(), component_type: ty, component_count: count }
    }

    #[test]
    fn s6_packs_six_parameters_of_one_lighting_model() {
        let model = LightingModel {
            name: "Standard".to_string(),
            parameters: vec![
                param("albedo", ComponentType::Unorm8, 3),
                param("normal", ComponentType::Sfloat16, 2),
                param("metallic", ComponentType::Unorm8, 1),
                param("roughness", ComponentType::Unorm8, 1),
                param("emissive", ComponentType::Sfloat16, 3),
                param("ao", ComponentType::Unorm8, 1),
            ],
        };
        let gbuffer = pack(&[model]).unwrap();
        assert!(gbuffer.is_compatible(&LightingModel {
            name: "Standard".to_string(),
            parameters: vec![param("albedo", ComponentType::Unorm8, 3)],
        }));
        let mut seen = std::collections::HashSet::new();
        for texture in &gbuffer.textures {
            for components in &texture.components {
                for component in components {
                    assert!(seen.insert(component.name.clone()), "component placed twice: {}", component.name);
                }
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn parameters_of_the_same_model_never_share_a_channel() {
        let model = LightingModel {
            name: "Solo".to_string(),
            parameters: vec![param("a", ComponentType::Unorm8, 1), param("b", ComponentType::Unorm8, 1)],
        };
        let gbuffer = pack(&[model]).unwrap();
        let tex_a = gbuffer.texture_for_component("a").unwrap();
        let tex_b = gbuffer.texture_for_component("b").unwrap();
        if tex_a.name == tex_b.name {
            for components in &tex_a.components {
                let names: Vec<&str> = components.iter().map(|c| c.name.as_str()).collect();
                assert!(!(names.contains(&"a") && names.contains(&"b")));
            }
        }
    }

    #[test]
    fn conflicting_formats_for_the_same_name_fail() {
        let models = vec![
            LightingModel { name: "A".to_string(), parameters: vec![param("shared", ComponentType::Unorm8, 1)] },
            LightingModel { name: "B".to_string(), parameters: vec![param("shared", ComponentType::Sfloat32, 1)] },
        ];
        assert!(matches!(pack(&models), Err(PackError::ConflictingFormat { .. })));
    }

    #[test]
    fn independent_models_can_share_a_channel() {
        let models = vec![
            LightingModel { name: "A".to_string(), parameters: vec![param("a", ComponentType::Unorm8, 1)] },
            LightingModel { name: "B".to_string(), parameters: vec![param("b", ComponentType::Unorm8, 1)] },
        ];
        let gbuffer = pack(&models).unwrap();
        assert_eq!(gbuffer.textures.len(), 1);
    }
}
