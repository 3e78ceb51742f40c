//! System prompt assembly.
//!
//! Combines the fixed policy text with the rendered catalog context into one
//! system instruction. The policy pins the answer language (Ukrainian only),
//! length (1–3 sentences, no counter-questions) and the fallback for titles
//! that are not in the catalog (state absence, never fabricate).
//!
//! The catalog context is embedded verbatim and never truncated: silently
//! dropping entries would turn "this title is not on the site" into a
//! non-deterministic failure for titles that actually are. Oversized prompts
//! are reported via [`exceeds_budget`] so the caller can log a warning.

/// Assemble the system instruction for one request.
///
/// Pure: the same context always yields the same instruction.
pub fn system_prompt(context: &str) -> String {
    format!(
        "Ти — помічник на сайті з фільмами та мультфільмами для Соні. \n\n\
         ВАЖЛИВО:\n\
         - Відповідай ТІЛЬКИ українською мовою.\n\
         - Відповідай ДУЖЕ коротко: 1-3 речення максимум.\n\
         - НЕ задавай зустрічних запитань.\n\
         - НЕ веди діалог, просто відповідай на одне питання.\n\
         - Якщо питання не стосується фільмів/мультфільмів з цього списку — дай коротку відповідь і нагадай, що ти тут щоб допомогти знайти або обрати фільм зі списку на сайті. Намагайся не давати занадто довгих відповідей.\n\
         - Якщо фільму/мультфільму немає в списку — чесно скажи, що його немає на сайті.\n\n\
         Ось список доступного контенту на сайті:\n\n\
         {context}\n\n\
         Відповідай лаконічно і по суті."
    )
}

/// Whether an assembled prompt is over the soft size threshold.
///
/// Exceeding the budget is a diagnostic condition, not an error: the prompt
/// is still sent in full. The comparison counts characters to match how the
/// catalog caps descriptions.
pub fn exceeds_budget(prompt: &str, threshold_chars: usize) -> bool {
    prompt.chars().count() > threshold_chars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_verbatim() {
        let context = "• Капітошка () — мультфільм, н/д, реж. невідомо. Веселий дощик.";
        let prompt = system_prompt(context);
        assert!(prompt.contains(context), "context must be embedded as a contiguous substring");
    }

    #[test]
    fn prompt_never_truncates_a_large_context() {
        // Far beyond any soft threshold — still embedded whole.
        let line = "• Назва () — мультфільм, н/д, реж. невідомо. Опис.\n";
        let context: String = line.repeat(5_000);
        let prompt = system_prompt(context.trim_end());
        assert!(prompt.contains(context.trim_end()));
    }

    #[test]
    fn prompt_keeps_the_full_policy_text() {
        let prompt = system_prompt("");
        assert!(prompt.contains("ТІЛЬКИ українською"));
        assert!(prompt.contains("1-3 речення"));
        assert!(prompt.contains("немає на сайті"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let context = "• A (B) — фільм, 2001, реж. Хтось. Опис.";
        assert_eq!(system_prompt(context), system_prompt(context));
    }

    #[test]
    fn budget_check_flags_only_oversized_prompts() {
        assert!(!exceeds_budget("короткий", 100));
        let long: String = "п".repeat(101);
        assert!(exceeds_budget(&long, 100));
        // exactly at the threshold is still within budget
        let exact: String = "р".repeat(100);
        assert!(!exceeds_budget(&exact, 100));
    }
}
