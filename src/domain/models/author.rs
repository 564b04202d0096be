use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

/// Which side of the two-party conversation wrote a message.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumVariantNames,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SenderRole {
    Trainer,
    Counterpart,
}

impl SenderRole {
    pub fn parse(text: &str) -> Option<SenderRole> {
        return SenderRole::iter().find(|e| return e.to_string() == text);
    }

    pub fn from_trainer_flag(is_from_trainer: bool) -> SenderRole {
        if is_from_trainer {
            return SenderRole::Trainer;
        }

        return SenderRole::Counterpart;
    }

    pub fn is_trainer(&self) -> bool {
        return *self == SenderRole::Trainer;
    }
}
