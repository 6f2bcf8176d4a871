use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KycStep {
    #[default]
    PersonalInformation,
    InvestmentType,
    GeneralInformation,
    FinalDeclaration,
}

impl KycStep {
    pub const ALL: [KycStep; 4] = [
        KycStep::PersonalInformation,
        KycStep::InvestmentType,
        KycStep::GeneralInformation,
        KycStep::FinalDeclaration,
    ];

    pub const fn title(self) -> &'static str {
        match self {
            KycStep::PersonalInformation => "Personal information",
            KycStep::InvestmentType => "Investment type",
            KycStep::GeneralInformation => "General information",
            KycStep::FinalDeclaration => "Final declaration & review",
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            KycStep::PersonalInformation => 1,
            KycStep::InvestmentType => 2,
            KycStep::GeneralInformation => 3,
            KycStep::FinalDeclaration => 4,
        }
    }

    /// Next sub-step; the final declaration stays put.
    pub fn advance(self) -> KycStep {
        match self {
            KycStep::PersonalInformation => KycStep::InvestmentType,
            KycStep::InvestmentType => KycStep::GeneralInformation,
            KycStep::GeneralInformation | KycStep::FinalDeclaration => KycStep::FinalDeclaration,
        }
    }
}

/// Identity details collected on the first sub-step. Not validated.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityDetails {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub id_number: String,
    pub country_of_issuance: String,
    pub gender: String,
    pub city: String,
    pub country: String,
    pub postal_code: String,
    pub street: String,
    pub building_number: String,
    pub apartment_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_every_step_then_saturates() {
        let mut step = KycStep::default();
        let mut seen = vec![step];
        for _ in 0..5 {
            step = step.advance();
            if seen.last() != Some(&step) {
                seen.push(step);
            }
        }
        assert_eq!(seen, KycStep::ALL.to_vec());
        assert_eq!(step.number(), 4);
        assert_eq!(step.title(), "Final declaration & review");
    }
}
