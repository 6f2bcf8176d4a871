use tracing::{debug, info};

use super::funnel::{
    FunnelState, FunnelStatePatch, FunnelStateStore, NavigationParams, StorageError,
};
use super::gate::{
    BankTransferEvent, BankTransferState, ConfirmGate, ConfirmInput, EntryAction, EntryGate,
    Route, Step, amount_edit_opens_income_modal, bank_transfer_gate, confirm_gate, entry_gate,
    payment_method_gate,
};
use super::kyc::{IdentityDetails, KycStep};
use super::modal::{
    DeclarationOrigin, IncomeModalView, ModalContext, ModalCoordinator, ModalEffect, ModalEvent,
    ModalState,
};
use super::payment::{PaymentGateway, PaymentOutcome, PaymentSubmission, UploadSink};
use super::types::{FunnelRules, Money, PaymentMethod};

/// One investor's walk through the funnel.
///
/// The session owns the current route (step plus carried navigation parameters), the dialog
/// state, and the bank-transfer upload state. Everything that must outlive a step goes through
/// the injected store.
pub struct FunnelSession<S, G, U> {
    rules: FunnelRules,
    store: S,
    gateway: G,
    uploads: U,
    route: Route,
    modal: ModalCoordinator,
    bank_transfer: BankTransferState,
    kyc_step: KycStep,
    identity: IdentityDetails,
}

impl<S, G, U> FunnelSession<S, G, U>
where
    S: FunnelStateStore,
    G: PaymentGateway,
    U: UploadSink,
{
    pub fn new(rules: FunnelRules, store: S, gateway: G, uploads: U) -> Self {
        Self {
            rules,
            store,
            gateway,
            uploads,
            route: Route::to(Step::Entry),
            modal: ModalCoordinator::new(),
            bank_transfer: BankTransferState::Pending,
            kyc_step: KycStep::default(),
            identity: IdentityDetails::default(),
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn modal_state(&self) -> ModalState {
        self.modal.state()
    }

    pub fn bank_transfer(&self) -> &BankTransferState {
        &self.bank_transfer
    }

    pub fn kyc_step(&self) -> KycStep {
        self.kyc_step
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn uploads(&self) -> &U {
        &self.uploads
    }

    /// Persisted record seen through the current step's navigation parameters.
    pub fn state(&self) -> FunnelState {
        self.store.get_with_params(&self.route.params)
    }

    fn modal_context(&self) -> ModalContext {
        let state = self.state();
        ModalContext {
            amount: state.amount.unwrap_or(Money::ZERO),
            prior_invested: self.rules.prior_invested,
            payment_complete: self.bank_transfer.is_complete(),
        }
    }

    pub fn income_modal(&self) -> Option<IncomeModalView> {
        self.modal.view(&self.modal_context())
    }

    fn navigate(&mut self, route: Route) -> Route {
        debug!(href = %route.href(), "navigate");
        self.route = route;
        route
    }

    pub fn entry_gate(&self, amount: Money) -> EntryGate {
        entry_gate(&self.rules, amount, None)
    }

    /// "Invest" on the entry step. Returns the new route when the funnel moved forward.
    ///
    /// An actionable amount starts a new funnel: the record left by any earlier one is wiped.
    pub fn invest(&mut self, amount: Money) -> Result<Option<Route>, StorageError> {
        let gate = self.entry_gate(amount);
        if !gate.invest_enabled {
            return Ok(None);
        }
        self.store.clear()?;
        self.route = Route::with_params(
            Step::Entry,
            NavigationParams {
                amount: Some(amount),
                income_range: None,
            },
        );
        self.modal = ModalCoordinator::new();
        self.bank_transfer = BankTransferState::Pending;
        self.kyc_step = KycStep::default();
        self.identity = IdentityDetails::default();

        Ok(match gate.on_continue {
            EntryAction::Blocked => None,
            EntryAction::DeclareIncome => {
                let ctx = self.modal_context();
                self.modal.handle(
                    ModalEvent::OpenIncomeDeclaration {
                        origin: DeclarationOrigin::Entry,
                    },
                    &ctx,
                );
                None
            }
            EntryAction::Advance { route } => Some(self.navigate(route)),
        })
    }

    /// Feeds one dialog event through the coordinator and applies its effects.
    pub fn modal_event(&mut self, event: ModalEvent) -> Result<Option<Route>, StorageError> {
        let ctx = self.modal_context();
        let effects = self.modal.handle(event, &ctx);
        let mut moved = None;
        for effect in effects {
            match effect {
                ModalEffect::CommitBracket { bracket, origin } => {
                    self.store.set(FunnelStatePatch::income_range(bracket))?;
                    self.route.params.income_range = Some(bracket);
                    if origin == DeclarationOrigin::Entry {
                        moved = Some(self.navigate(Route::with_params(
                            Step::Confirm,
                            NavigationParams {
                                amount: Some(ctx.amount),
                                income_range: Some(bracket),
                            },
                        )));
                    }
                }
                ModalEffect::ReturnToAmount { origin } => {
                    if origin == DeclarationOrigin::Entry {
                        moved = Some(self.navigate(Route::with_params(
                            Step::Confirm,
                            NavigationParams {
                                amount: Some(ctx.amount),
                                income_range: None,
                            },
                        )));
                    }
                }
                ModalEffect::AcknowledgeLeavingIncomplete => {
                    self.store.set(FunnelStatePatch::left_incomplete())?;
                }
                ModalEffect::LeaveFunnel => {
                    moved = Some(self.navigate(Route::to(Step::MyInvestments)));
                }
            }
        }
        Ok(moved)
    }

    /// Amount edit on the confirm step. Stays local to the step until "Continue".
    pub fn edit_confirm_amount(&mut self, raw: &str) {
        let amount = Money::parse(raw).unwrap_or(Money::ZERO);
        self.route.params.amount = Some(amount);
        let declared = self.state().income_range;
        if amount_edit_opens_income_modal(&self.rules, amount, declared) && !self.modal.is_open() {
            let ctx = self.modal_context();
            self.modal.handle(
                ModalEvent::OpenIncomeDeclaration {
                    origin: DeclarationOrigin::Confirm,
                },
                &ctx,
            );
        }
    }

    pub fn confirm_gate(&self, input: &ConfirmInput) -> ConfirmGate {
        confirm_gate(&self.rules, &self.state(), input)
    }

    pub fn confirm_continue(
        &mut self,
        input: &ConfirmInput,
    ) -> Result<Option<Route>, StorageError> {
        let gate = self.confirm_gate(input);
        if !gate.continue_enabled {
            debug!(blockers = ?gate.blockers, "confirm step blocked");
            return Ok(None);
        }
        let state = self.state();
        self.store.set(FunnelStatePatch {
            amount: state.amount,
            income_range: state.income_range,
            ..FunnelStatePatch::default()
        })?;
        Ok(Some(self.navigate(Route::to(Step::PaymentMethod))))
    }

    pub fn choose_payment_method(
        &mut self,
        method: Option<PaymentMethod>,
    ) -> Result<Option<Route>, StorageError> {
        let gate = payment_method_gate(method, self.store.get().amount);
        let (Some(method), Some(route)) = (method, gate.route) else {
            return Ok(None);
        };
        self.store.set(FunnelStatePatch::payment_method(method))?;
        if method == PaymentMethod::BankTransfer {
            self.bank_transfer = BankTransferState::Pending;
        }
        Ok(Some(self.navigate(route)))
    }

    /// Card step: commits the carried amount, emits the submission and advances on success.
    pub fn pay_by_card(&mut self) -> Result<(PaymentSubmission, PaymentOutcome), StorageError> {
        let state = self.store.reconcile(&self.route.params)?;
        let submission = PaymentSubmission::new(&self.rules, state.amount.unwrap_or(Money::ZERO));
        let outcome = self.gateway.submit(&submission);
        if outcome == PaymentOutcome::Succeeded {
            self.store.set(FunnelStatePatch::payment_complete())?;
            self.navigate(Route::to(Step::Kyc));
        }
        Ok((submission, outcome))
    }

    pub fn bank_transfer_event(
        &mut self,
        event: BankTransferEvent,
    ) -> Result<Option<Route>, StorageError> {
        let submitting = event == BankTransferEvent::Submit;
        if submitting && !bank_transfer_gate(&self.bank_transfer).submit_enabled {
            return Ok(None);
        }
        let file = self.bank_transfer.attached_file().cloned();
        self.bank_transfer = std::mem::take(&mut self.bank_transfer).transition(event);

        if submitting && self.bank_transfer.is_complete() {
            if let Some(file) = file {
                self.uploads.confirmation_submitted(&file);
            }
            self.store.set(FunnelStatePatch::payment_complete())?;
            return Ok(Some(self.navigate(Route::to(Step::Kyc))));
        }
        Ok(None)
    }

    pub fn transfer_later(&mut self) -> Result<Option<Route>, StorageError> {
        if !bank_transfer_gate(&self.bank_transfer).transfer_later_enabled {
            return Ok(None);
        }
        self.modal_event(ModalEvent::TransferLater)
    }

    /// Intercepted page-leave. `true` means the host may let the navigation proceed.
    pub fn attempt_leave(&mut self) -> Result<bool, StorageError> {
        if self.route.step != Step::BankTransfer {
            return Ok(true);
        }
        if matches!(self.modal.state(), ModalState::ConfirmingAbandon { .. }) {
            return Ok(true);
        }
        let moved = self.modal_event(ModalEvent::PageLeaveAttempt)?;
        Ok(moved.is_some())
    }

    /// Continue on the current KYC sub-step. Continuing past the final declaration completes
    /// the funnel and discards its record.
    pub fn kyc_continue(&mut self, details: IdentityDetails) -> Result<KycStep, StorageError> {
        match self.kyc_step {
            KycStep::PersonalInformation => self.identity = details,
            KycStep::FinalDeclaration => {
                self.store.clear()?;
                info!("funnel completed");
                return Ok(self.kyc_step);
            }
            _ => {}
        }
        self.kyc_step = self.kyc_step.advance();
        info!(step = self.kyc_step.number(), "identity step advanced");
        Ok(self.kyc_step)
    }

    pub fn identity(&self) -> &IdentityDetails {
        &self.identity
    }
}
