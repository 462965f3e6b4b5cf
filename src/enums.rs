use std::fmt;

/// MRI acquisition sequence supplying one input channel.
///
/// The declaration order is the channel order of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    T1,
    T1ce,
    T2,
    Flair,
}

impl Modality {
    pub const COUNT: usize = 4;

    /// All modalities in channel order.
    pub const ALL: [Modality; Self::COUNT] =
        [Modality::T1, Modality::T1ce, Modality::T2, Modality::Flair];

    /// Index of this modality on the channel axis.
    pub const fn channel(self) -> usize {
        match self {
            Modality::T1 => 0,
            Modality::T1ce => 1,
            Modality::T2 => 2,
            Modality::Flair => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Modality::T1 => "T1",
            Modality::T1ce => "T1ce",
            Modality::T2 => "T2",
            Modality::Flair => "FLAIR",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tumor sub-regions predicted by the segmentation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TumorClass {
    Background,
    /// Necrotic and non-enhancing tumor core.
    NcrNet,
    Edema,
    EnhancingTumor,
}

impl TumorClass {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(TumorClass::Background),
            1 => Some(TumorClass::NcrNet),
            2 => Some(TumorClass::Edema),
            3 => Some(TumorClass::EnhancingTumor),
            _ => None,
        }
    }

    pub const fn id(self) -> u32 {
        match self {
            TumorClass::Background => 0,
            TumorClass::NcrNet => 1,
            TumorClass::Edema => 2,
            TumorClass::EnhancingTumor => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            TumorClass::Background => "Background",
            TumorClass::NcrNet => "NCR/NET",
            TumorClass::Edema => "Edema",
            TumorClass::EnhancingTumor => "Enhancing Tumor",
        }
    }

    /// Display name for a class id, with a generic label for ids outside the table.
    pub fn label_for(id: u32) -> String {
        match Self::from_id(id) {
            Some(class) => class.label().to_string(),
            None => format!("Class {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_order_matches_declaration() {
        for (index, modality) in Modality::ALL.iter().enumerate() {
            assert_eq!(modality.channel(), index);
        }
        assert_eq!(Modality::Flair.to_string(), "FLAIR");
    }

    #[test]
    fn class_ids_roundtrip_through_table() {
        for id in 0..4 {
            assert_eq!(TumorClass::from_id(id).map(TumorClass::id), Some(id));
        }
        assert_eq!(TumorClass::label_for(3), "Enhancing Tumor");
        assert_eq!(TumorClass::label_for(7), "Class 7");
    }
}
