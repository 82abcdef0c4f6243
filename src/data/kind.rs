use serde::{Deserialize, Serialize};

/// The kind of raw sample a project consumes or produces.
///
/// The serialized names match the values project configuration files use on
/// disk; the aliases accept the shorter spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    #[serde(rename = "Color Image")]
    ColorImage,
    #[serde(rename = "Black and White Image", alias = "Grayscale Image")]
    GrayscaleImage,
    Audio,
    Text,
    #[serde(rename = "Identification", alias = "Categorical")]
    Categorical,
    #[serde(rename = "Other", alias = "Opaque")]
    Opaque,
}

impl DataKind {
    /// True for the label-valued kind whose samples are class names.
    pub fn is_categorical(&self) -> bool {
        matches!(self, DataKind::Categorical)
    }

    /// Rank of the normalized tensor, where fixed by the kind.
    /// `Audio` and `Opaque` carry their shape in the payload.
    pub fn fixed_rank(&self) -> Option<usize> {
        match self {
            DataKind::ColorImage | DataKind::GrayscaleImage => Some(3),
            DataKind::Text | DataKind::Categorical => Some(1),
            DataKind::Audio | DataKind::Opaque => None,
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataKind::ColorImage => "Color Image",
            DataKind::GrayscaleImage => "Black and White Image",
            DataKind::Audio => "Audio",
            DataKind::Text => "Text",
            DataKind::Categorical => "Identification",
            DataKind::Opaque => "Other",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for (kind, wire) in [
            (DataKind::ColorImage, "\"Color Image\""),
            (DataKind::GrayscaleImage, "\"Black and White Image\""),
            (DataKind::Audio, "\"Audio\""),
            (DataKind::Text, "\"Text\""),
            (DataKind::Categorical, "\"Identification\""),
            (DataKind::Opaque, "\"Other\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), wire);
            assert_eq!(serde_json::from_str::<DataKind>(wire).unwrap(), kind);
        }
    }

    #[test]
    fn aliases_are_accepted() {
        assert_eq!(
            serde_json::from_str::<DataKind>("\"Grayscale Image\"").unwrap(),
            DataKind::GrayscaleImage
        );
        assert_eq!(
            serde_json::from_str::<DataKind>("\"Categorical\"").unwrap(),
            DataKind::Categorical
        );
        assert_eq!(
            serde_json::from_str::<DataKind>("\"Opaque\"").unwrap(),
            DataKind::Opaque
        );
    }
}
