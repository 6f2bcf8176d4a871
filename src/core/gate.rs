use serde::{Deserialize, Serialize};

use super::eligibility::evaluate;
use super::funnel::{FunnelState, NavigationParams};
use super::payment::AttachedFile;
use super::types::{EligibilityVerdict, FunnelRules, IncomeBracket, Money, PaymentMethod};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Entry,
    Confirm,
    PaymentMethod,
    CreditCard,
    BankTransfer,
    Kyc,
    MyInvestments,
}

impl Step {
    pub const fn path(self) -> &'static str {
        match self {
            Step::Entry => "/",
            Step::Confirm => "/invest/1",
            Step::PaymentMethod => "/invest/2",
            Step::CreditCard => "/invest/3",
            Step::BankTransfer => "/invest/bank-transfer",
            Step::Kyc => "/kyc",
            Step::MyInvestments => "/invest/my-investments",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub step: Step,
    pub params: NavigationParams,
}

impl Route {
    pub fn to(step: Step) -> Self {
        Self {
            step,
            params: NavigationParams::default(),
        }
    }

    pub fn with_params(step: Step, params: NavigationParams) -> Self {
        Self { step, params }
    }

    pub fn href(&self) -> String {
        let query = self.params.to_query();
        if query.is_empty() {
            self.step.path().to_string()
        } else {
            format!("{}?{query}", self.step.path())
        }
    }
}

/// Raises a positive amount below the minimum up to the minimum, as the entry field does on blur.
pub fn clamp_to_minimum(rules: &FunnelRules, amount: Money) -> Money {
    if !amount.is_zero() && amount < rules.minimum_investment {
        rules.minimum_investment
    } else {
        amount
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum EntryAction {
    Blocked,
    DeclareIncome,
    Advance { route: Route },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryGate {
    pub invest_enabled: bool,
    pub on_continue: EntryAction,
}

pub fn entry_gate(
    rules: &FunnelRules,
    amount: Money,
    income_range: Option<IncomeBracket>,
) -> EntryGate {
    if !rules.meets_minimum(amount) {
        return EntryGate {
            invest_enabled: false,
            on_continue: EntryAction::Blocked,
        };
    }

    let on_continue = if rules.requires_declaration(amount) && income_range.is_none() {
        EntryAction::DeclareIncome
    } else {
        EntryAction::Advance {
            route: Route::with_params(
                Step::Confirm,
                NavigationParams {
                    amount: Some(amount),
                    income_range,
                },
            ),
        }
    };
    EntryGate {
        invest_enabled: true,
        on_continue,
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Acknowledgements {
    pub risk_disclosure_accepted: bool,
    pub own_funds_confirmed: bool,
    /// Optional consent to appear publicly on the platform.
    pub public_display_consent: bool,
}

impl Acknowledgements {
    pub fn required_accepted(&self) -> bool {
        self.risk_disclosure_accepted && self.own_funds_confirmed
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmInput {
    pub acknowledgements: Acknowledgements,
    pub signature_present: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmBlocker {
    AcknowledgementMissing,
    SignatureMissing,
    AmountMissing,
    BelowMinimum,
    DeclarationRequired,
    BracketInsufficient,
}

/// Inline notice rendered under the confirm-step amount field.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AmountNotice {
    WithinLimit,
    #[serde(rename_all = "camelCase")]
    DeclarationRequired {
        threshold: Money,
        prior_invested: Money,
        annual_limit: Money,
    },
    Declared {
        amount: Money,
    },
    BracketInsufficient {
        reason: String,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmGate {
    pub continue_enabled: bool,
    pub blockers: Vec<ConfirmBlocker>,
    pub notice: AmountNotice,
    pub verdict: Option<EligibilityVerdict>,
}

pub fn confirm_gate(rules: &FunnelRules, state: &FunnelState, input: &ConfirmInput) -> ConfirmGate {
    let mut blockers = Vec::new();
    if !input.acknowledgements.required_accepted() {
        blockers.push(ConfirmBlocker::AcknowledgementMissing);
    }
    if !input.signature_present {
        blockers.push(ConfirmBlocker::SignatureMissing);
    }

    let mut notice = AmountNotice::WithinLimit;
    let mut verdict = None;
    match state.amount {
        None => blockers.push(ConfirmBlocker::AmountMissing),
        Some(amount) => {
            if !rules.meets_minimum(amount) {
                blockers.push(ConfirmBlocker::BelowMinimum);
            }
            if rules.requires_declaration(amount) {
                match state.income_range {
                    None => {
                        blockers.push(ConfirmBlocker::DeclarationRequired);
                        notice = AmountNotice::DeclarationRequired {
                            threshold: rules.income_modal_threshold,
                            prior_invested: rules.prior_invested,
                            annual_limit: IncomeBracket::Low.limits().cross_offer_cap(),
                        };
                    }
                    Some(bracket) => {
                        let outcome = evaluate(bracket, amount, rules.prior_invested);
                        notice = match &outcome.reason {
                            None => AmountNotice::Declared { amount },
                            Some(reason) => {
                                blockers.push(ConfirmBlocker::BracketInsufficient);
                                AmountNotice::BracketInsufficient {
                                    reason: reason.clone(),
                                }
                            }
                        };
                        verdict = Some(outcome);
                    }
                }
            }
        }
    }

    ConfirmGate {
        continue_enabled: blockers.is_empty(),
        blockers,
        notice,
        verdict,
    }
}

/// Editing the confirm-step amount above the threshold with nothing declared pops the modal.
pub fn amount_edit_opens_income_modal(
    rules: &FunnelRules,
    amount: Money,
    income_range: Option<IncomeBracket>,
) -> bool {
    rules.requires_declaration(amount) && income_range.is_none()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodGate {
    pub continue_enabled: bool,
    pub route: Option<Route>,
}

/// Card payments carry the persisted amount forward (zero when nothing was stored).
pub fn payment_method_gate(
    selected: Option<PaymentMethod>,
    persisted_amount: Option<Money>,
) -> PaymentMethodGate {
    let route = selected.map(|method| match method {
        PaymentMethod::CreditCard => Route::with_params(
            Step::CreditCard,
            NavigationParams {
                amount: Some(persisted_amount.unwrap_or(Money::ZERO)),
                income_range: None,
            },
        ),
        PaymentMethod::BankTransfer => Route::to(Step::BankTransfer),
    });
    PaymentMethodGate {
        continue_enabled: route.is_some(),
        route,
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BankTransferState {
    #[default]
    Pending,
    ConfirmationUploaded {
        file: AttachedFile,
    },
    Complete,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BankTransferEvent {
    Attach { file: AttachedFile },
    Detach,
    Submit,
}

impl BankTransferState {
    /// `Complete` is terminal: every event leaves it unchanged.
    pub fn transition(self, event: BankTransferEvent) -> BankTransferState {
        match (self, event) {
            (BankTransferState::Complete, _) => BankTransferState::Complete,
            (_, BankTransferEvent::Attach { file }) => {
                BankTransferState::ConfirmationUploaded { file }
            }
            (_, BankTransferEvent::Detach) => BankTransferState::Pending,
            (BankTransferState::ConfirmationUploaded { .. }, BankTransferEvent::Submit) => {
                BankTransferState::Complete
            }
            (BankTransferState::Pending, BankTransferEvent::Submit) => BankTransferState::Pending,
        }
    }

    pub fn attached_file(&self) -> Option<&AttachedFile> {
        match self {
            BankTransferState::ConfirmationUploaded { file } => Some(file),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, BankTransferState::Complete)
    }

    pub fn requires_leave_warning(&self) -> bool {
        !self.is_complete()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferGate {
    pub submit_enabled: bool,
    pub transfer_later_enabled: bool,
    pub leave_warning_required: bool,
}

pub fn bank_transfer_gate(state: &BankTransferState) -> BankTransferGate {
    BankTransferGate {
        submit_enabled: matches!(state, BankTransferState::ConfirmationUploaded { .. }),
        transfer_later_enabled: matches!(state, BankTransferState::Pending),
        leave_warning_required: state.requires_leave_warning(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(value: u64) -> Money {
        Money::from_units(value)
    }

    fn signed_input() -> ConfirmInput {
        ConfirmInput {
            acknowledgements: Acknowledgements {
                risk_disclosure_accepted: true,
                own_funds_confirmed: true,
                public_display_consent: false,
            },
            signature_present: true,
        }
    }

    fn state_with(amount: u64, range: Option<IncomeBracket>) -> FunnelState {
        FunnelState {
            amount: Some(units(amount)),
            income_range: range,
            ..FunnelState::default()
        }
    }

    #[test]
    fn entry_threshold_is_exclusive() {
        let rules = FunnelRules::default();
        let at = entry_gate(&rules, units(8_000), None);
        assert!(at.invest_enabled);
        assert!(matches!(at.on_continue, EntryAction::Advance { .. }));

        let over = entry_gate(&rules, units(8_001), None);
        assert!(over.invest_enabled);
        assert_eq!(over.on_continue, EntryAction::DeclareIncome);
    }

    #[test]
    fn entry_blocks_below_minimum() {
        let rules = FunnelRules::default();
        let gate = entry_gate(&rules, units(999), None);
        assert!(!gate.invest_enabled);
        assert_eq!(gate.on_continue, EntryAction::Blocked);
        assert!(entry_gate(&rules, units(1_000), None).invest_enabled);
    }

    #[test]
    fn entry_advance_carries_amount_and_declared_range() {
        let rules = FunnelRules::default();
        let gate = entry_gate(&rules, units(12_000), Some(IncomeBracket::Medium));
        let EntryAction::Advance { route } = gate.on_continue else {
            panic!("expected advance, got {:?}", gate.on_continue);
        };
        assert_eq!(route.href(), "/invest/1?amount=12000&incomeRange=medium");
    }

    #[test]
    fn clamp_raises_small_positive_amounts_only() {
        let rules = FunnelRules::default();
        assert_eq!(clamp_to_minimum(&rules, units(500)), units(1_000));
        assert_eq!(clamp_to_minimum(&rules, Money::ZERO), Money::ZERO);
        assert_eq!(clamp_to_minimum(&rules, units(6_000)), units(6_000));
    }

    #[test]
    fn confirm_requires_every_required_input() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(&rules, &FunnelState::default(), &ConfirmInput::default());
        assert!(!gate.continue_enabled);
        assert_eq!(
            gate.blockers,
            vec![
                ConfirmBlocker::AcknowledgementMissing,
                ConfirmBlocker::SignatureMissing,
                ConfirmBlocker::AmountMissing,
            ]
        );
    }

    #[test]
    fn confirm_public_display_consent_is_optional() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(&rules, &state_with(6_000, None), &signed_input());
        assert!(gate.continue_enabled);
        assert_eq!(gate.notice, AmountNotice::WithinLimit);
        assert!(gate.verdict.is_none());
    }

    #[test]
    fn confirm_above_threshold_needs_declaration() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(&rules, &state_with(8_001, None), &signed_input());
        assert!(!gate.continue_enabled);
        assert_eq!(gate.blockers, vec![ConfirmBlocker::DeclarationRequired]);
        assert_eq!(
            gate.notice,
            AmountNotice::DeclarationRequired {
                threshold: units(8_000),
                prior_invested: units(15_000),
                annual_limit: units(23_250),
            }
        );
    }

    #[test]
    fn confirm_rejects_bracket_that_cannot_cover_amount() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(
            &rules,
            &state_with(11_625, Some(IncomeBracket::Low)),
            &signed_input(),
        );
        assert!(!gate.continue_enabled);
        assert_eq!(gate.blockers, vec![ConfirmBlocker::BracketInsufficient]);
        assert!(matches!(gate.notice, AmountNotice::BracketInsufficient { .. }));
    }

    #[test]
    fn confirm_accepts_valid_declared_bracket() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(
            &rules,
            &state_with(12_000, Some(IncomeBracket::Medium)),
            &signed_input(),
        );
        assert!(gate.continue_enabled);
        assert_eq!(gate.notice, AmountNotice::Declared { amount: units(12_000) });
        assert!(gate.verdict.is_some_and(|v| v.valid));
    }

    #[test]
    fn confirm_blocks_amount_below_minimum() {
        let rules = FunnelRules::default();
        let gate = confirm_gate(&rules, &state_with(500, None), &signed_input());
        assert_eq!(gate.blockers, vec![ConfirmBlocker::BelowMinimum]);
    }

    #[test]
    fn amount_edit_modal_trigger_respects_declared_range() {
        let rules = FunnelRules::default();
        assert!(amount_edit_opens_income_modal(&rules, units(9_000), None));
        assert!(!amount_edit_opens_income_modal(
            &rules,
            units(9_000),
            Some(IncomeBracket::Low)
        ));
        assert!(!amount_edit_opens_income_modal(&rules, units(8_000), None));
    }

    #[test]
    fn payment_method_routes_by_selection() {
        let none = payment_method_gate(None, Some(units(6_000)));
        assert!(!none.continue_enabled);
        assert!(none.route.is_none());

        let card = payment_method_gate(Some(PaymentMethod::CreditCard), Some(units(6_000)));
        assert!(card.continue_enabled);
        assert_eq!(card.route.map(|r| r.href()).as_deref(), Some("/invest/3?amount=6000"));

        let card_without_amount = payment_method_gate(Some(PaymentMethod::CreditCard), None);
        assert_eq!(
            card_without_amount.route.map(|r| r.href()).as_deref(),
            Some("/invest/3?amount=0")
        );

        let transfer = payment_method_gate(Some(PaymentMethod::BankTransfer), None);
        assert_eq!(
            transfer.route.map(|r| r.href()).as_deref(),
            Some("/invest/bank-transfer")
        );
    }

    #[test]
    fn attach_then_detach_returns_to_pending() {
        let state = BankTransferState::Pending
            .transition(BankTransferEvent::Attach {
                file: AttachedFile::new("receipt.pdf"),
            })
            .transition(BankTransferEvent::Detach);
        assert_eq!(state, BankTransferState::Pending);
    }

    #[test]
    fn submit_completes_and_is_terminal() {
        let complete = BankTransferState::Pending
            .transition(BankTransferEvent::Attach {
                file: AttachedFile::new("receipt.pdf"),
            })
            .transition(BankTransferEvent::Submit);
        assert_eq!(complete, BankTransferState::Complete);

        assert_eq!(
            complete.clone().transition(BankTransferEvent::Detach),
            BankTransferState::Complete
        );
        assert_eq!(
            complete.transition(BankTransferEvent::Attach {
                file: AttachedFile::new("other.pdf"),
            }),
            BankTransferState::Complete
        );
    }

    #[test]
    fn submit_without_file_stays_pending() {
        assert_eq!(
            BankTransferState::Pending.transition(BankTransferEvent::Submit),
            BankTransferState::Pending
        );
    }

    #[test]
    fn submit_and_transfer_later_are_mutually_exclusive() {
        let pending = bank_transfer_gate(&BankTransferState::Pending);
        assert!(!pending.submit_enabled);
        assert!(pending.transfer_later_enabled);
        assert!(pending.leave_warning_required);

        let uploaded = bank_transfer_gate(&BankTransferState::ConfirmationUploaded {
            file: AttachedFile::new("receipt.pdf"),
        });
        assert!(uploaded.submit_enabled);
        assert!(!uploaded.transfer_later_enabled);
        assert!(uploaded.leave_warning_required);

        let complete = bank_transfer_gate(&BankTransferState::Complete);
        assert!(!complete.submit_enabled);
        assert!(!complete.transfer_later_enabled);
        assert!(!complete.leave_warning_required);
    }
}
