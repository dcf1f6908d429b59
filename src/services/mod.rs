// Core services
pub mod requisitions;
pub mod stock;

// Dispatch numbering
pub mod numbering;

// Approval chain resolution (external collaborator seam)
pub mod approvals;

// Product master and ad-hoc issue audit
pub mod catalog;
pub mod issues;
