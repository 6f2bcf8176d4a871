mod eligibility;
mod funnel;
mod gate;
mod kyc;
mod modal;
mod payment;
mod session;
mod types;

pub use eligibility::{evaluate, lowest_eligible_bracket};
pub use funnel::{
    AMOUNT_KEY, FileStorage, FunnelState, FunnelStatePatch, FunnelStateStore, KeyValueFunnelStore,
    KeyValueStorage, MemoryFunnelStore, MemoryStorage, NavigationParams, RawNavigationParams,
    StorageError,
};
pub use gate::{
    Acknowledgements, AmountNotice, BankTransferEvent, BankTransferGate, BankTransferState,
    ConfirmBlocker, ConfirmGate, ConfirmInput, EntryAction, EntryGate, PaymentMethodGate, Route,
    Step, amount_edit_opens_income_modal, bank_transfer_gate, clamp_to_minimum, confirm_gate,
    entry_gate, payment_method_gate,
};
pub use kyc::{IdentityDetails, KycStep};
pub use modal::{
    AbandonTrigger, BracketOption, DeclarationOrigin, IncomeModalView, ModalContext,
    ModalCoordinator, ModalEffect, ModalEvent, ModalState, Transition, income_modal_view,
    selection_is_valid, transition,
};
pub use payment::{
    AttachedFile, LoggingUploadSink, PaymentGateway, PaymentOutcome, PaymentSubmission,
    StubGateway, UploadSink,
};
pub use session::FunnelSession;
pub use types::{
    BracketLimits, DEFAULT_ENTRY_AMOUNT, DEFAULT_INCOME_MODAL_THRESHOLD,
    DEFAULT_MINIMUM_INVESTMENT, DEFAULT_PAYMENT_FEE_BPS, DEFAULT_PRIOR_INVESTED,
    EligibilityVerdict, FunnelRules, IncomeBracket, Money, PRESET_AMOUNTS, PaymentMethod,
    ViolatedRule,
};
