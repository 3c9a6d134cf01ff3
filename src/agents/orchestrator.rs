//! Orchestrator Agent：在 Topic 之间选择子图，不修改状态

use crate::agents::AgentConfig;
use crate::core::{AgentError, ConversationState};
use crate::graph::{Goto, Step};
use crate::llm::{decide_checked, Decision, DecisionOracle, DecisionRequest, DecisionShape};
use crate::memory::Message;

pub struct OrchestratorAgent {
    config: AgentConfig,
}

impl OrchestratorAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn routes(&self) -> Vec<String> {
        self.config.route_names().into_iter().map(String::from).collect()
    }

    pub async fn step(
        &self,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        let routes = self.routes();
        if let [only] = routes.as_slice() {
            tracing::info!(route = %only, "single route");
            return Ok(Step::goto(Goto::Subgraph(only.clone())));
        }

        let mut messages = vec![Message::system(self.config.system_prompt.clone())];
        messages.extend(self.config.history.select(state.channel(&self.config.channel)));
        let request = DecisionRequest::new(self.config.name.clone(), messages)
            .allow(&[DecisionShape::Route])
            .with_routes(routes);

        match decide_checked(oracle, &request).await? {
            Decision::Route { thought, route } => {
                tracing::info!(route = %route, thought = %thought, "routed");
                Ok(Step::goto(Goto::Subgraph(route)))
            }
            other => Err(AgentError::DisallowedDecision {
                agent: self.config.name.clone(),
                shape: other.shape().as_str().to_string(),
            }),
        }
    }
}
