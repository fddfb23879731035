mod docs;
mod id;
mod id_generator;
mod ledger;
mod planning;

pub use docs::{
    AnalysisCooldown, AnalysisSnapshot, IdeaEvaluation, Milestone, MonthlyMetrics, MudraDprRecord,
    ProjectReport, UserXp,
};
pub use id::Id;
pub use id_generator::{FixedIdGenerator, IdGenerator, UuidIdGenerator};
pub use ledger::{
    CashflowPoint, DailyTrend, SpendingSummary, Transaction, TransactionFilter, TransactionType,
};
pub use planning::{
    Budget, BusinessProfile, BillItem, BillSplit, Customer, Goal, GoalStatus, GstSplit, Invoice,
    InvoiceItem, LoanTerms, MerchantRule, PaymentFrequency, PaymentHistory, PaymentStatus,
    PaymentType, Period, ScheduledPayment, ScheduledPaymentStatus, SplitItem, Vendor,
    VendorPayment,
};
