#[derive(Debug, Clone, PartialEq)]
pub struct LayerProperties {
    pub id: String,
    pub name: String,
    pub z_index: i32,
    pub opacity: f32,
    pub visible: bool,
}

impl LayerProperties {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            z_index: 0,
            opacity: 1.0,
            visible: false,
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self::new("default".to_string(), "Default Layer".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_properties() {
        let mut props = LayerProperties::new("m31".to_string(), "M31 band 0".to_string());

        assert_eq!(props.id, "m31");
        assert_eq!(props.name, "M31 band 0");
        assert_eq!(props.z_index, 0);
        assert!(!props.visible);

        props.set_opacity(1.5);
        assert_eq!(props.opacity, 1.0);
    }
}
