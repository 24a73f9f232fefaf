//! English stopwords plus issue-tracker boilerplate that would otherwise
//! dominate every wordcloud.

static STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "cannot", "could", "did", "didn", "do", "does", "doesn", "doing",
    "don", "down", "during", "each", "few", "for", "from", "further", "get", "got", "had", "has",
    "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "i",
    "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "like", "me", "more", "most",
    "my", "myself", "new", "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "still", "such", "than", "that", "the", "their", "theirs", "them", "themselves",
    "then", "there", "these", "they", "this", "those", "through", "to", "too", "under", "until",
    "up", "use", "used", "using", "very", "was", "wasn", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves",
    // Tracker boilerplate
    "add", "bug", "code", "error", "feature", "fix", "issue", "make", "need", "please",
    "problem", "question", "request", "support", "thanks", "try", "tried", "version", "want",
    "work", "working", "works",
];

#[inline]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_words_are_stopwords() {
        assert!(is_stopword("the"));
        assert!(is_stopword("and"));
        assert!(is_stopword("issue"));
    }

    #[test]
    fn content_words_are_not() {
        assert!(!is_stopword("database"));
        assert!(!is_stopword("crash"));
        assert!(!is_stopword("timeout"));
    }
}
