//! Stream producer for the loan sales assistant.
//!
//! A [`LoanAgent`] is a blocking, callback-driven call. [`StreamProducer`]
//! runs it on a blocking worker and turns its callbacks into an ordered
//! stream of [`lendflow_types::ChatEvent`]s that a transport can forward.

pub mod agent;
pub mod context;
pub mod hooks;
pub mod producer;
pub mod remote;
pub mod rules;
pub mod scripted;

pub use agent::{CustomerContext, LoanAgent, RunHooks, TurnInput};
pub use context::build_context_message;
pub use hooks::{AgentSignal, ChannelHooks};
pub use producer::{ProducerConfig, StreamProducer};
pub use remote::RemoteAgent;
pub use rules::{CheckpointRules, DecisionRule, ResultMatcher};
pub use scripted::{ScriptStep, ScriptedAgent};
