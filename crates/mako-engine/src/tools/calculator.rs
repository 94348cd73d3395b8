use async_trait::async_trait;
use mako_core::tools::{Tool, ToolContext, ToolError, ToolResult};

/// Basic arithmetic on two numbers.
pub struct CalculatorTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(Self::Add),
            "subtract" => Some(Self::Subtract),
            "multiply" => Some(Self::Multiply),
            "divide" => Some(Self::Divide),
            _ => None,
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, ToolError> {
        match self {
            Self::Add => Ok(a + b),
            Self::Subtract => Ok(a - b),
            Self::Multiply => Ok(a * b),
            Self::Divide if b == 0.0 => {
                Err(ToolError::ExecutionFailed("division by zero".into()))
            }
            Self::Divide => Ok(a / b),
        }
    }
}

/// Integral results print without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic: add, subtract, multiply or divide two numbers"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["operation", "a", "b"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The operation to perform"
                },
                "a": {
                    "type": "number",
                    "description": "First operand"
                },
                "b": {
                    "type": "number",
                    "description": "Second operand"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let raw_op = args["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("operation is required".into()))?;
        let op = Operation::parse(raw_op).ok_or_else(|| {
            ToolError::InvalidArguments(format!("unsupported operation: {raw_op}"))
        })?;
        let a = args["a"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("a must be a number".into()))?;
        let b = args["b"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("b must be a number".into()))?;

        let value = op.apply(a, b)?;
        Ok(ToolResult::ok(format_number(value)))
    }
}
