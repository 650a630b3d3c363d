//! Remote sync: gateways, the per-project policy, and the pass orchestrator.
//!
//! Each project `<name>` is bound to the remote repository
//! `<prefix>-<name>` on the authenticated account.

mod local;
mod naming;
mod orchestrator;
mod policy;
mod remote;
mod session;

pub use local::{GitLocalProjectService, LocalProjectService, auth_header};
pub use naming::{RemoteNaming, find_available_name, timestamped_name};
pub use orchestrator::{
    GatewayFactory, GitHubGatewayFactory, ProjectReport, SyncMode, SyncOrchestrator, SyncReport,
};
pub use policy::{
    BeforeMoveHook, PolicyVerdict, ProjectSyncOutcome, SyncDecision, SyncPolicyEngine,
    SyncPrompter, decide, resolve_deletion,
};
pub use remote::{GitHubRepositoryService, RemoteRepositoryService, RepoInfo, fetch_login};
pub use session::{AuthProvider, Session, SessionHolder, TokenAuthProvider};
