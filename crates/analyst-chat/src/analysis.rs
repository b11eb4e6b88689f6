//! One-shot structured analysis of a single business requirement.

use std::sync::Arc;

use tracing::info;

use analyst_core::types::Message;
use analyst_llm::{ChatModel, ChatRequest, GenerationOptions};

use crate::error::ChatError;

const ANALYSIS_PROMPT: &str = r#"You are a highly skilled and meticulous **Senior Business Analyst (BA) Agent**. Your sole job is to
translate vague business requirements into a **comprehensive, multi-layered technical analysis** document.

---
### **INSTRUCTION: STRUCTURED REQUIREMENT DECOMPOSITION**
You must convert the BUSINESS REQUIREMENT into the following **seven (7)** clearly labeled, detailed sections. Maintain an objective, professional tone throughout.
---

**1. SCOPE AND ASSUMPTIONS**
    * **1.1 In-Scope:** State the primary features and user roles that MUST be included in the development effort.
    * **1.2 Out-of-Scope:** Explicitly list 1-2 elements the development team should NOT implement based on the vagueness of the requirement.
    * **1.3 Key Assumptions:** List 2 critical underlying conditions that must be true for the project to succeed.

**2. FUNCTIONAL REQUIREMENTS (FRs)**
    * List at least **7 concrete, measurable, and testable statements** detailing what the system MUST do. Use action verbs (e.g., "The system shall automatically calculate...").

**3. NON-FUNCTIONAL REQUIREMENTS (NFRs)**
    * List at least **5 specific, measurable statements** covering performance, security, usability/accessibility and scalability.

**4. USER STORY**
    * Create **one primary user story**: **As a [User Role], I want [Goal], so that [Reason/Benefit].**

**5. KEY DATA ENTITIES**
    * Identify and list at least **3 critical data concepts** or objects the system will need to manage.

**6. HIGH-LEVEL USER JOURNEY**
    * Outline the **4-6 high-level steps** a primary user takes to complete the core task. This must be a sequential process.

**7. ACCEPTANCE CRITERIA (for User Story)**
    * List **3 specific, pass/fail conditions** in the form "Given X, when Y, then Z".

---
**BUSINESS REQUIREMENT:** "{business_req}"
---

**ANALYSIS DOCUMENT:**
"#;

/// Expands a single requirement into a seven-section analysis.
#[derive(Clone)]
pub struct RequirementAnalyzer {
    model: Option<Arc<dyn ChatModel>>,
    max_chars: usize,
}

impl RequirementAnalyzer {
    pub fn new(model: Option<Arc<dyn ChatModel>>, max_chars: usize) -> Self {
        Self { model, max_chars }
    }

    pub fn build_request(requirement: &str) -> ChatRequest {
        ChatRequest::new(
            vec![Message::user(
                ANALYSIS_PROMPT.replace("{business_req}", requirement),
            )],
            GenerationOptions::default()
                .temperature(0.2)
                .num_predict(4000)
                .top_p(0.9),
        )
    }

    pub async fn analyze(&self, requirement: &str) -> Result<String, ChatError> {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if requirement.chars().count() > self.max_chars {
            return Err(ChatError::MessageTooLong(self.max_chars));
        }
        let model = self.model.as_ref().ok_or(ChatError::ServiceUnavailable)?;

        info!(chars = requirement.len(), model = model.name(), "Analyzing requirement");
        let analysis = model.chat(&Self::build_request(requirement)).await?;
        Ok(analysis.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_llm::ScriptedModel;

    #[test]
    fn test_prompt_embeds_requirement() {
        let request = RequirementAnalyzer::build_request("Customers can reorder past purchases");
        let prompt = &request.messages[0].content;
        assert!(prompt.contains(r#"**BUSINESS REQUIREMENT:** "Customers can reorder past purchases""#));
        assert!(prompt.contains("**7. ACCEPTANCE CRITERIA (for User Story)**"));
        assert!(!prompt.contains("{business_req}"));
    }

    #[tokio::test]
    async fn test_analyze_returns_model_text() {
        let model = Arc::new(ScriptedModel::default().with_reply("  **1. SCOPE AND ASSUMPTIONS** ...\n"));
        let analyzer = RequirementAnalyzer::new(Some(model.clone() as Arc<dyn ChatModel>), 4000);

        let analysis = analyzer.analyze("Online table booking").await.unwrap();
        assert_eq!(analysis, "**1. SCOPE AND ASSUMPTIONS** ...");
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_requirement_rejected() {
        let analyzer = RequirementAnalyzer::new(Some(Arc::new(ScriptedModel::default()) as Arc<dyn ChatModel>), 4000);
        assert!(matches!(analyzer.analyze("  ").await, Err(ChatError::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_too_long_requirement_rejected() {
        let analyzer = RequirementAnalyzer::new(Some(Arc::new(ScriptedModel::default()) as Arc<dyn ChatModel>), 10);
        assert!(matches!(
            analyzer.analyze("a requirement that is far too long").await,
            Err(ChatError::MessageTooLong(10))
        ));
    }

    #[tokio::test]
    async fn test_without_model() {
        let analyzer = RequirementAnalyzer::new(None, 4000);
        assert!(matches!(
            analyzer.analyze("Online table booking").await,
            Err(ChatError::ServiceUnavailable)
        ));
    }
}
