//! Prompt templates for function evolution

/// Prompt builders for the rewrite and self-correction requests
pub struct PromptTemplate;

const CONSTRAINTS: &str = "\
### STRICT CONSTRAINTS:
1. **PRESERVE SIGNATURE**: Do NOT change the function name, parameters, or their order.
2. **NO ASSIGNMENT WRAPPERS**: Do NOT wrap the output in `const functionName = ...` or `export ...` unless it was in the original code.
3. **PRESERVE FUNCTION TYPE**: If the original is an anonymous arrow function `(req, res) =>`, keep it as an anonymous arrow function. A declaration stays a declaration, a method stays a method.
4. **NO MARKDOWN**: Return ONLY the raw JavaScript code. Do not wrap it in ``` fences. Do not include any explanations or conversational text.
5. **PRESERVE LOGIC**: Do not remove error handling, logging, or alter business logic.
6. **FORMATTING**: Do not aggressively reformat or add/remove semicolons if no logical optimizations are needed.";

impl PromptTemplate {
    /// System-free user prompt asking for a modernized rewrite
    pub fn evolve(name: &str, body: &str) -> String {
        format!(
            "You are an expert JavaScript/Node.js refactoring engine.
Your task is to modernize and optimize the provided function while strictly preserving its original behavior, inputs, and outputs.

### REFACTORING GOALS:
- Convert Promise chains (.then/.catch) and callbacks to `async/await`.
- Reduce nesting by using early returns (guard clauses).
- Use modern ES6+ features (destructuring, template literals, default parameters, optional chaining `?.`, nullish coalescing `??`).
- Replace index-based `for` loops with array methods (`.map`, `.filter`, `.reduce`) where appropriate and readable.
- Remove redundant variable assignments and `var` declarations (prefer `const`).

{constraints}

Original Name: {name}
Original Code:
{body}",
            constraints = CONSTRAINTS,
            name = name.trim(),
            body = body.trim(),
        )
    }

    /// Prompt for the single self-correction attempt after a failed validation
    pub fn correction(name: &str, body: &str, diagnostic: &str) -> String {
        format!(
            "You are an expert JavaScript/Node.js refactoring engine.
Your previous refactor of \"{name}\" caused a SyntaxError when the file was checked:

{diagnostic}

Rewrite the original function again. Fix the syntax: make sure every `{{` has a matching `}}` and every `(` has a matching `)`. Return ONLY the raw code.

{constraints}

Original Name: {name}
Original Code:
{body}",
            constraints = CONSTRAINTS,
            name = name.trim(),
            diagnostic = diagnostic.trim(),
            body = body.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evolve_prompt_carries_constraints_and_code() {
        let prompt = PromptTemplate::evolve(" load ", "\nfunction load() { var x = 1; }\n");
        assert!(prompt.contains("Original Name: load\n"));
        assert!(prompt.ends_with("function load() { var x = 1; }"));
        assert!(prompt.contains("PRESERVE SIGNATURE"));
        assert!(prompt.contains("NO ASSIGNMENT WRAPPERS"));
        assert!(prompt.contains("NO MARKDOWN"));
        assert!(prompt.contains("PRESERVE LOGIC"));
    }

    #[test]
    fn test_correction_prompt_includes_diagnostic() {
        let prompt = PromptTemplate::correction(
            "load",
            "function load() {}",
            "file.js:3\nSyntaxError: Unexpected token '}'",
        );
        assert!(prompt.contains("SyntaxError: Unexpected token '}'"));
        assert!(prompt.contains("every `{` has a matching `}`"));
        assert!(prompt.contains("Original Code:\nfunction load() {}"));
    }
}
