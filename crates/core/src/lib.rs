pub mod artifact;
pub mod chain;
pub mod detect;
pub mod directives;
pub mod executor;
pub mod governance;
pub mod ird_log;
pub mod report;
pub mod session;
pub mod shots;
pub mod taes;
pub mod validate;

pub use artifact::{
    Analysis, ArtifactKind, CourierRow, Critique, KpiRow, Production, ProofScores, Registry, Role,
    RoleOutput, Severity, SpecType, Strategy,
};
pub use chain::{run_chain, Chain, ChainOutcome, ChainResults, RoleResult};
pub use detect::{Signal, SignalHit};
pub use governance::{GovernanceEngine, GovernanceOutcome};
pub use taes::{TaesEvaluator, TaesRecord};
pub use validate::{ValidationError, ValidationReason};
