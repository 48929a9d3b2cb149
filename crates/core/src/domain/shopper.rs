use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceType {
    Brand,
    Dietary,
    Favorite,
    Dislike,
    Allergy,
}

impl PreferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Dietary => "dietary",
            Self::Favorite => "favorite",
            Self::Dislike => "dislike",
            Self::Allergy => "allergy",
        }
    }
}

impl std::str::FromStr for PreferenceType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "brand" => Ok(Self::Brand),
            "dietary" => Ok(Self::Dietary),
            "favorite" => Ok(Self::Favorite),
            "dislike" => Ok(Self::Dislike),
            "allergy" => Ok(Self::Allergy),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown preference type `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub preference_type: PreferenceType,
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub times_confirmed: u32,
}

impl UserPreference {
    pub fn new(preference_type: PreferenceType, key: impl Into<String>, confidence: f64) -> Self {
        Self {
            preference_type,
            key: key.into(),
            value: None,
            confidence: confidence.clamp(0.0, 1.0),
            times_confirmed: 0,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn normalized_key(&self) -> String {
        self.key.trim().to_lowercase()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseHistoryEntry {
    pub sku: String,
    pub purchase_count: u32,
    pub days_since_last: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdRole {
    Adult,
    Senior,
    Teen,
    Child,
    Toddler,
    Baby,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub role: HouseholdRole,
    #[serde(default)]
    pub age_category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub pet_type: String,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    Active,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifestyle {
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub fitness_level: Option<FitnessLevel>,
}

/// Facts discovered about the shopper's household.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseholdContext {
    #[serde(default)]
    pub people: Vec<HouseholdMember>,
    #[serde(default)]
    pub pets: Vec<Pet>,
    #[serde(default)]
    pub lifestyle: Lifestyle,
}

impl HouseholdContext {
    pub fn has_discovered_facts(&self) -> bool {
        !self.people.is_empty()
            || !self.pets.is_empty()
            || !self.lifestyle.dietary_preferences.is_empty()
            || self.lifestyle.fitness_level.is_some()
    }

    pub fn has_role(&self, role: HouseholdRole) -> bool {
        self.people.iter().any(|person| person.role == role)
    }

    pub fn prefers_organic(&self) -> bool {
        self.lifestyle
            .dietary_preferences
            .iter()
            .any(|preference| preference.trim().eq_ignore_ascii_case("organic"))
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.lifestyle.fitness_level,
            Some(FitnessLevel::Active) | Some(FitnessLevel::ModeratelyActive)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FitnessLevel, HouseholdContext, HouseholdMember, HouseholdRole, Lifestyle, PreferenceType,
        UserPreference,
    };

    #[test]
    fn preference_type_round_trips_through_str() {
        for kind in [
            PreferenceType::Brand,
            PreferenceType::Dietary,
            PreferenceType::Favorite,
            PreferenceType::Dislike,
            PreferenceType::Allergy,
        ] {
            assert_eq!(kind.as_str().parse::<PreferenceType>(), Ok(kind));
        }
        assert!("hobby".parse::<PreferenceType>().is_err());
    }

    #[test]
    fn confidence_is_clamped_on_construction() {
        let preference = UserPreference::new(PreferenceType::Brand, "Acme", 1.7);
        assert_eq!(preference.confidence, 1.0);
    }

    #[test]
    fn empty_household_has_no_facts() {
        assert!(!HouseholdContext::default().has_discovered_facts());

        let household = HouseholdContext {
            people: vec![HouseholdMember { role: HouseholdRole::Baby, age_category: None }],
            lifestyle: Lifestyle {
                dietary_preferences: vec!["Organic".to_string()],
                fitness_level: Some(FitnessLevel::ModeratelyActive),
            },
            ..HouseholdContext::default()
        };
        assert!(household.has_discovered_facts());
        assert!(household.has_role(HouseholdRole::Baby));
        assert!(household.prefers_organic());
        assert!(household.is_active());
    }
}
