use serde::{Deserialize, Serialize};
use tracing::debug;

use super::eligibility::evaluate;
use super::types::{IncomeBracket, Money};

/// Which step opened the income declaration. Decides where "change amount" lands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationOrigin {
    Entry,
    Confirm,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbandonTrigger {
    TransferLater,
    PageLeave,
}

/// Blocking dialog currently shown, if any.
///
/// A bracket picked inside the income modal lives here and nowhere else until it is submitted,
/// so closing a dialog can never leak a half-made choice into the funnel record.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ModalState {
    #[default]
    Closed,
    AwaitingBracket {
        origin: DeclarationOrigin,
        selected: Option<IncomeBracket>,
    },
    /// "Change amount" vs "back to declaration", stacked on the income modal.
    ConfirmingIncomeClose {
        origin: DeclarationOrigin,
        selected: Option<IncomeBracket>,
    },
    ConfirmingAbandon {
        trigger: AbandonTrigger,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModalEvent {
    OpenIncomeDeclaration { origin: DeclarationOrigin },
    SelectBracket { bracket: IncomeBracket },
    SubmitBracket,
    RequestCloseIncome,
    ChangeAmount,
    BackToDeclaration,
    DismissCloseConfirmation,
    TransferLater,
    PageLeaveAttempt,
    BackToPayment,
    LeaveAnyway,
    DismissAbandon,
}

/// Funnel facts the transitions read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModalContext {
    pub amount: Money,
    pub prior_invested: Money,
    pub payment_complete: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModalEffect {
    CommitBracket {
        bracket: IncomeBracket,
        origin: DeclarationOrigin,
    },
    ReturnToAmount {
        origin: DeclarationOrigin,
    },
    AcknowledgeLeavingIncomplete,
    LeaveFunnel,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Transition {
    pub next: ModalState,
    pub effects: Vec<ModalEffect>,
}

impl Transition {
    fn stay(state: ModalState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }

    fn to(next: ModalState, effects: Vec<ModalEffect>) -> Self {
        Self { next, effects }
    }
}

pub fn selection_is_valid(selected: Option<IncomeBracket>, ctx: &ModalContext) -> bool {
    selected.is_some_and(|bracket| evaluate(bracket, ctx.amount, ctx.prior_invested).valid)
}

/// Single transition function for every dialog. Events that make no sense in the current
/// state leave it unchanged.
pub fn transition(state: ModalState, event: ModalEvent, ctx: &ModalContext) -> Transition {
    use ModalEvent as E;
    use ModalState as S;

    match (state, event) {
        (S::Closed, E::OpenIncomeDeclaration { origin }) => Transition::to(
            S::AwaitingBracket {
                origin,
                selected: None,
            },
            Vec::new(),
        ),
        (S::AwaitingBracket { origin, .. }, E::SelectBracket { bracket }) => Transition::to(
            S::AwaitingBracket {
                origin,
                selected: Some(bracket),
            },
            Vec::new(),
        ),
        (S::AwaitingBracket { origin, selected }, E::SubmitBracket) => match selected {
            Some(bracket) if selection_is_valid(selected, ctx) => Transition::to(
                S::Closed,
                vec![ModalEffect::CommitBracket { bracket, origin }],
            ),
            _ => Transition::stay(state),
        },
        (S::AwaitingBracket { origin, selected }, E::RequestCloseIncome) => Transition::to(
            S::ConfirmingIncomeClose { origin, selected },
            Vec::new(),
        ),
        (S::ConfirmingIncomeClose { origin, .. }, E::ChangeAmount | E::DismissCloseConfirmation) => {
            Transition::to(S::Closed, vec![ModalEffect::ReturnToAmount { origin }])
        }
        (S::ConfirmingIncomeClose { origin, selected }, E::BackToDeclaration) => {
            Transition::to(S::AwaitingBracket { origin, selected }, Vec::new())
        }
        (S::Closed, E::TransferLater) => Transition::to(
            S::ConfirmingAbandon {
                trigger: AbandonTrigger::TransferLater,
            },
            Vec::new(),
        ),
        (S::Closed, E::PageLeaveAttempt) if ctx.payment_complete => {
            Transition::to(S::Closed, vec![ModalEffect::LeaveFunnel])
        }
        (S::Closed, E::PageLeaveAttempt) => Transition::to(
            S::ConfirmingAbandon {
                trigger: AbandonTrigger::PageLeave,
            },
            Vec::new(),
        ),
        (S::ConfirmingAbandon { .. }, E::BackToPayment | E::DismissAbandon) => {
            Transition::to(S::Closed, Vec::new())
        }
        (S::ConfirmingAbandon { .. }, E::LeaveAnyway) => Transition::to(
            S::Closed,
            vec![
                ModalEffect::AcknowledgeLeavingIncomplete,
                ModalEffect::LeaveFunnel,
            ],
        ),
        (state, event) => {
            debug!(?state, ?event, "modal event ignored");
            Transition::stay(state)
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketOption {
    pub bracket: IncomeBracket,
    pub income_label: &'static str,
    pub max_per_offer: Money,
    pub max_across_offers: Option<Money>,
    pub per_offer_qualifier: Option<&'static str>,
    pub selected: bool,
    pub invalid: bool,
}

/// What the income declaration dialog shows for the current selection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeModalView {
    pub amount: Money,
    pub options: Vec<BracketOption>,
    pub error: Option<String>,
    pub submit_enabled: bool,
}

pub fn income_modal_view(state: &ModalState, ctx: &ModalContext) -> Option<IncomeModalView> {
    let selected = match state {
        ModalState::AwaitingBracket { selected, .. }
        | ModalState::ConfirmingIncomeClose { selected, .. } => *selected,
        _ => return None,
    };
    let verdict = selected.map(|bracket| evaluate(bracket, ctx.amount, ctx.prior_invested));

    let options = IncomeBracket::ALL
        .into_iter()
        .map(|bracket| {
            let limits = bracket.limits();
            let is_selected = selected == Some(bracket);
            BracketOption {
                bracket,
                income_label: limits.income_label,
                max_per_offer: limits.max_per_offer,
                max_across_offers: limits.max_across_offers,
                per_offer_qualifier: limits.per_offer_qualifier,
                selected: is_selected,
                invalid: is_selected && verdict.as_ref().is_some_and(|v| !v.valid),
            }
        })
        .collect();

    Some(IncomeModalView {
        amount: ctx.amount,
        options,
        submit_enabled: verdict.as_ref().is_some_and(|v| v.valid),
        error: verdict.and_then(|v| v.reason),
    })
}

/// Holds the live dialog state and feeds events through [`transition`].
#[derive(Debug, Default, Clone)]
pub struct ModalCoordinator {
    state: ModalState,
}

impl ModalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModalState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != ModalState::Closed
    }

    pub fn handle(&mut self, event: ModalEvent, ctx: &ModalContext) -> Vec<ModalEffect> {
        let Transition { next, effects } = transition(self.state, event, ctx);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "modal transition");
        }
        self.state = next;
        effects
    }

    pub fn view(&self, ctx: &ModalContext) -> Option<IncomeModalView> {
        income_modal_view(&self.state, ctx)
    }
}
