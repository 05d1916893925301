pub mod deposit;
pub mod reimbursement;
