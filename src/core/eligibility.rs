use super::types::{EligibilityVerdict, IncomeBracket, Money, ViolatedRule};

/// Checks one investment against the caps of a declared income bracket.
///
/// The per-offer cap is checked first; the cross-offer cap (which includes the investor's prior
/// twelve-month total) is only consulted when the per-offer check passes.
pub fn evaluate(bracket: IncomeBracket, amount: Money, prior_invested: Money) -> EligibilityVerdict {
    let limits = bracket.limits();

    if amount > limits.max_per_offer {
        let cap = match limits.per_offer_qualifier {
            Some(qualifier) => format!("{} {qualifier}", limits.max_per_offer),
            None => limits.max_per_offer.to_string(),
        };
        return EligibilityVerdict::rejected(
            ViolatedRule::PerOffer,
            format!(
                "This income range allows a maximum of {cap} per offer. Your investment of {amount} exceeds this limit."
            ),
        );
    }

    let total = amount.saturating_add(prior_invested);
    let cross_offer_cap = limits.cross_offer_cap();
    if total > cross_offer_cap {
        return EligibilityVerdict::rejected(
            ViolatedRule::CrossOffer,
            format!(
                "This income range allows a maximum of {cross_offer_cap} across all offers. With your previous investment of {prior_invested}, your total would be {total}, which exceeds this limit."
            ),
        );
    }

    EligibilityVerdict::allowed()
}

/// Lowest bracket under which `amount` is valid, if any.
pub fn lowest_eligible_bracket(amount: Money, prior_invested: Money) -> Option<IncomeBracket> {
    IncomeBracket::ALL
        .into_iter()
        .find(|bracket| evaluate(*bracket, amount, prior_invested).valid)
}
