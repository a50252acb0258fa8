//! Tool System
//!
//! Tools are external capabilities (search, calculation, document analysis)
//! invoked with a single text input and returning a single text output.
//! Each tool advertises capability tags so plans can match it to tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Capability tags (e.g. "code", "data", "visual")
    #[serde(default)]
    pub capability_tags: Vec<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool on a single input
    async fn execute(&self, input: &str) -> Result<String>;
}

/// Registry for available tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.execute(input).await
    }

    /// All tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time (UTC)".into(),
            capability_tags: vec!["reasoning".into()],
            has_side_effects: false,
        }
    }

    async fn execute(&self, _input: &str) -> Result<String> {
        let now = chrono::Utc::now();
        Ok(now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string())
    }
}

/// Calculator tool - evaluates arithmetic expressions found in its input
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculate".into(),
            description: "Evaluate every line of the input that is an arithmetic expression (+ - * / ^, parentheses, sqrt)".into(),
            capability_tags: vec!["code".into(), "data".into()],
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &str) -> Result<String> {
        let results: Vec<String> = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                evaluate_line(line)
                    .ok()
                    .map(|value| format!("{} = {}", line, value))
            })
            .collect();

        if results.is_empty() {
            return Err(AgentError::ToolExecution(
                "no arithmetic expression found in input".into(),
            ));
        }
        Ok(results.join("\n"))
    }
}

/// Longest line the calculator will try to evaluate. The evaluator recurses
/// per operator, so its depth is bounded by the line length.
const MAX_EXPRESSION_CHARS: usize = 256;

fn evaluate_line(line: &str) -> std::result::Result<f64, String> {
    if line.len() > MAX_EXPRESSION_CHARS {
        return Err(format!("Expression longer than {} characters", MAX_EXPRESSION_CHARS));
    }
    evaluate_expression(line)
}

/// Simple expression evaluator (for production, use meval or fasteval)
fn evaluate_expression(expr: &str) -> std::result::Result<f64, String> {
    let expr = expr.replace(' ', "");
    if expr.is_empty() {
        return Err("Empty expression".into());
    }

    // Innermost parentheses first; a preceding `sqrt` applies to the group
    if let Some(start) = expr.rfind('(') {
        let end = expr[start..]
            .find(')')
            .ok_or_else(|| "Unbalanced parentheses".to_string())?;
        let mut value = evaluate_expression(&expr[start + 1..start + end])?;
        let mut prefix_end = start;
        if expr[..start].ends_with("sqrt") {
            if value < 0.0 {
                return Err("Square root of negative number".into());
            }
            value = value.sqrt();
            prefix_end = start - "sqrt".len();
        }
        let new_expr = format!("{}{}{}", &expr[..prefix_end], value, &expr[start + end + 1..]);
        return evaluate_expression(&new_expr);
    }

    // Addition/subtraction (lowest precedence, evaluated last)
    for (i, c) in expr.char_indices().rev() {
        if i > 0 && (c == '+' || c == '-') {
            // Skip unary minus and exponent signs
            let prev_char = expr[..i].chars().next_back().unwrap_or(' ');
            if prev_char.is_ascii_digit() || prev_char == ')' || prev_char == '.' {
                let left = evaluate_expression(&expr[..i])?;
                let right = evaluate_expression(&expr[i + 1..])?;
                return Ok(if c == '+' { left + right } else { left - right });
            }
        }
    }

    // Multiplication/division
    for (i, c) in expr.char_indices().rev() {
        if c == '*' || c == '/' {
            let left = evaluate_expression(&expr[..i])?;
            let right = evaluate_expression(&expr[i + 1..])?;
            if c == '/' && right == 0.0 {
                return Err("Division by zero".into());
            }
            return Ok(if c == '*' { left * right } else { left / right });
        }
    }

    // Power
    if let Some(i) = expr.find('^') {
        let left = evaluate_expression(&expr[..i])?;
        let right = evaluate_expression(&expr[i + 1..])?;
        return Ok(left.powf(right));
    }

    // Parse number
    expr.parse::<f64>().map_err(|e| format!("Parse error: {}", e))
}
