//! Canned markdown sections and code templates.

use super::analysis::mentions;
use crate::models::GoalAnalysis;

const DATA_TEMPLATE: &str = r#"import pandas as pd
import numpy as np

# Sample data
data = pd.DataFrame({
    'date': pd.date_range('2024-01-01', periods=100),
    'value': np.random.randn(100).cumsum(),
    'category': np.random.choice(['A', 'B', 'C'], 100)
})

print("Data Shape:", data.shape)
print("\nFirst 5 rows:")
print(data.head())
print("\nSummary Statistics:")
print(data.describe())"#;

const CALCULATOR_TEMPLATE: &str = r#"import math

def calculate(expression):
    try:
        result = eval(expression)
        return f"Result: {result}"
    except Exception as e:
        return f"Error: {e}"

# Examples
print(calculate("2 + 2"))
print(calculate("10 * 5"))
print(calculate("math.sqrt(16)"))"#;

const GENERAL_TEMPLATE: &str = r#"# General purpose code template
def main():
    print("Hello! This is a code solution.")
    # Add your logic here
    pass

if __name__ == "__main__":
    main()"#;

/// Pick a code template for the goal.
pub fn code_solution(goal: &str) -> &'static str {
    let lowered = goal.to_lowercase();
    if mentions(&lowered, &["data", "analyze", "visualize", "chart"]) {
        DATA_TEMPLATE
    } else if mentions(&lowered, &["calculator", "math", "calculate"]) {
        CALCULATOR_TEMPLATE
    } else {
        GENERAL_TEMPLATE
    }
}

pub fn educational_section(goal: &str) -> Vec<String> {
    vec![
        "## 📚 Educational Content\n".to_string(),
        "### Overview".to_string(),
        format!("Let me help you learn about: {goal}\n"),
        "### Key Concepts".to_string(),
        "1. **Foundation**: Understanding the basics is crucial".to_string(),
        "2. **Practice**: Apply what you learn through exercises".to_string(),
        "3. **Deep Dive**: Explore advanced topics once comfortable\n".to_string(),
        "### Learning Path".to_string(),
        "- Start with fundamentals".to_string(),
        "- Build small projects".to_string(),
        "- Learn from examples".to_string(),
        "- Practice regularly\n".to_string(),
    ]
}

pub fn problem_solving_section() -> Vec<String> {
    [
        "## 🔧 Problem Solving Approach\n",
        "### 1. Understand the Problem",
        "- Define what needs to be solved",
        "- Identify constraints and requirements\n",
        "### 2. Break It Down",
        "- Divide into smaller sub-problems",
        "- Tackle each piece individually\n",
        "### 3. Implement Solution",
        "- Start with a simple approach",
        "- Test and iterate",
        "- Optimize as needed\n",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Next-step suggestions; always ends with the follow-up prompt.
pub fn suggestions(analysis: &GoalAnalysis) -> Vec<&'static str> {
    let mut out = Vec::new();
    if analysis.needs_research {
        out.push("Explore the research results above for detailed information");
    }
    if analysis.needs_code {
        out.push("Try modifying the code to fit your specific needs");
        out.push("Test the code with your own data");
    }
    if analysis.is_educational {
        out.push("Practice with examples to reinforce learning");
        out.push("Explore related topics to deepen understanding");
    }
    out.push("Ask follow-up questions if you need clarification");
    out
}

pub fn fallback_response(goal: &str) -> String {
    format!(
        "## Response to: {goal}

I've analyzed your request. Here's what I can help with:

- **Research**: I can search multiple sources for information
- **Code**: I can generate and execute code solutions
- **Education**: I can explain concepts step-by-step
- **Problem Solving**: I can help break down and solve problems

Please provide more details or ask a specific question, and I'll provide a more targeted response."
    )
}
