//! Plan Builder
//!
//! Binds each analyzed task to a model and tools from the capability
//! registry, orders steps by priority and derives the dependency graph.
//!
//! Dependency policy: every step depends on the step the analyzer listed
//! immediately before it, whatever the task types. Execution therefore runs
//! in analyzer order even though `steps` is presented by priority.

use std::collections::BTreeSet;

use crate::analyzer::AnalysisResult;
use crate::error::OrchestratorError;
use crate::graph::DependencyGraph;
use crate::model::{CapabilityDescriptor, ExecutionPlan, PlanStep};
use crate::registry::CapabilityRegistry;

/// Builds execution plans from analysis results
pub struct PlanBuilder;

impl PlanBuilder {
    /// Resolve hints, assign capabilities, sort and chain the steps.
    ///
    /// Fails only when the registry holds no model at all.
    pub fn build_plan(
        request: &str,
        analysis: &AnalysisResult,
        registry: &CapabilityRegistry,
    ) -> Result<ExecutionPlan, OrchestratorError> {
        let tools = Self::resolve_tools(&analysis.suggested_tools, registry);
        let primary_model = Self::primary_model(&analysis.model_types, registry)?;

        let mut steps: Vec<PlanStep> = analysis
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let tag = task.task_type.as_tag();
                let assigned_tools = tools.iter().filter(|t| t.has_tag(tag)).cloned().collect();
                let assigned_model = registry
                    .find_best_for_tag(tag)
                    .unwrap_or(&primary_model)
                    .clone();

                PlanStep {
                    index,
                    task: task.clone(),
                    assigned_model,
                    assigned_tools,
                    depends_on: BTreeSet::new(),
                }
            })
            .collect();

        // Stable: equal priorities keep analyzer order
        steps.sort_by(|a, b| b.task.priority.cmp(&a.task.priority));

        let dependency_graph = Self::build_dependency_graph(analysis.tasks.len());
        for step in &mut steps {
            step.depends_on = dependency_graph.dependencies(step.index).collect();
        }

        tracing::info!(
            steps = steps.len(),
            tools = tools.len(),
            primary = %primary_model.qualified_name(),
            "Built execution plan"
        );

        Ok(ExecutionPlan {
            request_text: request.to_string(),
            steps,
            dependency_graph,
            primary_model,
        })
    }

    /// Exact-name tool matches, unmatched names dropped, duplicates removed
    fn resolve_tools(suggested: &[String], registry: &CapabilityRegistry) -> Vec<CapabilityDescriptor> {
        let mut resolved: Vec<CapabilityDescriptor> = Vec::new();
        for name in suggested {
            match registry.find_tool(name) {
                Some(tool) if !resolved.iter().any(|t| t.identifier == tool.identifier) => {
                    resolved.push(tool.clone());
                }
                Some(_) => {}
                None => tracing::debug!(tool = %name, "Dropping unknown suggested tool"),
            }
        }
        resolved
    }

    /// First model matched from the type hints, else the "general" pick,
    /// else the first registered model
    fn primary_model(
        model_types: &[String],
        registry: &CapabilityRegistry,
    ) -> Result<CapabilityDescriptor, OrchestratorError> {
        model_types
            .iter()
            .find_map(|tag| registry.find_best_for_tag(tag))
            .or_else(|| registry.find_best_for_tag("general"))
            .or_else(|| registry.first_model())
            .cloned()
            .ok_or(OrchestratorError::NoCapableModel)
    }

    /// Linear chain over analyzer order: step `i` depends on step `i - 1`
    pub fn build_dependency_graph(task_count: usize) -> DependencyGraph {
        DependencyGraph::linear_chain(0..task_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::model::{Task, TaskType};
    use agent_core::tool::{CalculatorTool, DateTimeTool};
    use agent_core::ToolRegistry;

    fn registry() -> CapabilityRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        tools.register(DateTimeTool);
        CapabilityRegistry::with_preferences(
            vec![
                CapabilityDescriptor::model("openai", "gpt-4o", ["general"]),
                CapabilityDescriptor::model("deepseek", "deepseek-coder", ["code"]),
                CapabilityDescriptor::model("claude", "claude-sonnet", ["reasoning"]),
            ],
            tools,
            &OrchestratorConfig::default(),
        )
    }

    fn analysis(tasks: Vec<Task>, tools: &[&str], model_types: &[&str]) -> AnalysisResult {
        AnalysisResult {
            tasks,
            suggested_tools: tools.iter().map(|s| (*s).to_string()).collect(),
            model_types: model_types.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_population_scenario_ordering() {
        let analysis = analysis(
            vec![
                Task::new("Find the population of France", TaskType::Data, 4),
                Task::new("Compute its square root", TaskType::Code, 5),
            ],
            &["calculate"],
            &["general"],
        );
        let plan = PlanBuilder::build_plan("Find the population of France and compute its square root", &analysis, &registry()).unwrap();

        // Presentation: priority descending
        assert_eq!(plan.steps[0].task.task_type, TaskType::Code);
        assert_eq!(plan.steps[0].index, 1);
        assert_eq!(plan.steps[1].task.task_type, TaskType::Data);
        assert_eq!(plan.steps[1].index, 0);

        // Chain policy: the code task still waits for the data task
        assert_eq!(plan.steps[0].depends_on, BTreeSet::from([0]));
        assert!(plan.steps[1].depends_on.is_empty());
        assert_eq!(plan.dependency_graph.topological_order().unwrap(), vec![0, 1]);

        // Capability assignment
        assert_eq!(plan.steps[0].assigned_model.identifier, "deepseek-coder");
        assert_eq!(plan.steps[1].assigned_model.identifier, "gpt-4o");
        assert_eq!(plan.steps[0].assigned_tools[0].identifier, "calculate");
        assert_eq!(plan.primary_model.identifier, "gpt-4o");
    }

    #[test]
    fn test_unknown_tools_dropped_and_untagged_tools_unassigned() {
        let analysis = analysis(
            vec![Task::new("think", TaskType::Reasoning, 3), Task::new("draw", TaskType::Visual, 2)],
            &["web_search", "calculate", "datetime", "calculate"],
            &[],
        );
        let plan = PlanBuilder::build_plan("q", &analysis, &registry()).unwrap();

        let reasoning = plan.step(0).unwrap();
        let tools: Vec<&str> = reasoning.assigned_tools.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(tools, vec!["datetime"]);
        assert!(plan.step(1).unwrap().assigned_tools.is_empty());
    }

    #[test]
    fn test_model_falls_back_to_primary() {
        // visual prefers openai, claude, ollama; only deepseek registered
        let registry = CapabilityRegistry::with_preferences(
            vec![CapabilityDescriptor::model("deepseek", "deepseek-chat", ["general"])],
            ToolRegistry::new(),
            &OrchestratorConfig::default(),
        );
        let analysis = analysis(vec![Task::new("draw", TaskType::Visual, 3)], &[], &["visual"]);
        let plan = PlanBuilder::build_plan("q", &analysis, &registry).unwrap();
        assert_eq!(plan.primary_model.identifier, "deepseek-chat");
        assert_eq!(plan.steps[0].assigned_model.identifier, "deepseek-chat");
    }

    #[test]
    fn test_no_models_is_fatal() {
        let registry = CapabilityRegistry::with_preferences(Vec::new(), ToolRegistry::new(), &OrchestratorConfig::default());
        let result = PlanBuilder::build_plan("q", &AnalysisResult::fallback("q"), &registry);
        assert!(matches!(result, Err(OrchestratorError::NoCapableModel)));
    }

    #[test]
    fn test_equal_priorities_keep_analyzer_order() {
        let analysis = analysis(
            vec![
                Task::new("a", TaskType::Data, 2),
                Task::new("b", TaskType::Code, 4),
                Task::new("c", TaskType::Data, 2),
                Task::new("d", TaskType::Visual, 4),
            ],
            &[],
            &[],
        );
        let plan = PlanBuilder::build_plan("q", &analysis, &registry()).unwrap();
        let order: Vec<usize> = plan.steps.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    fn check_plan_invariants(tasks: Vec<Task>, registry: &CapabilityRegistry) {
        let n = tasks.len();
        let analysis = analysis(tasks, &["calculate", "datetime"], &["general"]);
        let plan = PlanBuilder::build_plan("q", &analysis, registry).unwrap();

        assert_eq!(plan.steps.len(), n);
        assert!(plan.dependency_graph.validate().is_ok());
        let order = plan.dependency_graph.topological_order().unwrap();
        assert_eq!(order.len(), n);
        for step in &plan.steps {
            assert!(step.depends_on.iter().all(|d| *d < step.index));
        }
        for pair in plan.steps.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.task.priority > b.task.priority || (a.task.priority == b.task.priority && a.index < b.index));
        }
    }

    #[test]
    fn test_dependency_graph_always_acyclic() {
        let registry = registry();
        let choices: Vec<(TaskType, u8)> = TaskType::ALL
            .iter()
            .flat_map(|t| (1..=5).map(move |p| (*t, p)))
            .collect();

        // Every list of length 1..=3
        for a in &choices {
            check_plan_invariants(vec![Task::new("a", a.0, a.1)], &registry);
            for b in &choices {
                check_plan_invariants(vec![Task::new("a", a.0, a.1), Task::new("b", b.0, b.1)], &registry);
                for c in &choices {
                    check_plan_invariants(
                        vec![Task::new("a", a.0, a.1), Task::new("b", b.0, b.1), Task::new("c", c.0, c.1)],
                        &registry,
                    );
                }
            }
        }

        // Seeded sample of longer lists
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..500 {
            #[allow(clippy::cast_possible_truncation)]
            let len = 4 + (next() % 12) as usize;
            let tasks = (0..len)
                .map(|i| {
                    #[allow(clippy::cast_possible_truncation)]
                    let (t, p) = choices[(next() % choices.len() as u64) as usize];
                    Task::new(format!("task {}", i), t, p)
                })
                .collect();
            check_plan_invariants(tasks, &registry);
        }
    }
}
