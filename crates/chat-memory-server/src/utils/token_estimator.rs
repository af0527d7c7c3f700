use crate::models::chat::PromptTurn;

/// Per-turn overhead the chat template adds around role + content.
const TURN_OVERHEAD_TOKENS: usize = 4;

/// Estimate tokens from text using a word-based heuristic (~1.3 tokens per word).
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();

    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

/// Estimate the size of a fully assembled prompt.
pub fn estimate_prompt_tokens(turns: &[PromptTurn]) -> usize {
    turns
        .iter()
        .map(|turn| estimate_tokens(&turn.content) + TURN_OVERHEAD_TOKENS)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimation() {
        // 7 words * 1.3 + 5 = 14.1
        let tokens = estimate_tokens("this is a test with seven words");
        assert_eq!(tokens, 15);
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_prompt_estimate_counts_every_turn() {
        let turns = vec![
            PromptTurn::system("You are helpful"),
            PromptTurn::user("hi there"),
        ];
        let expected = estimate_tokens("You are helpful") + estimate_tokens("hi there") + 8;
        assert_eq!(estimate_prompt_tokens(&turns), expected);
    }
}
