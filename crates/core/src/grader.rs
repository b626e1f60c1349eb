use crate::Relevance;

/// Structural sufficiency check: any retrieved passage at all is enough.
///
/// Content quality is not judged here; weak context shows up downstream as a
/// "not found" answer.
pub fn grade<T>(context: &[T]) -> Relevance {
    if context.is_empty() {
        Relevance::No
    } else {
        Relevance::Yes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_is_insufficient() {
        assert_eq!(grade::<String>(&[]), Relevance::No);
    }

    #[test]
    fn any_passage_is_sufficient() {
        assert_eq!(grade(&["".to_string()]), Relevance::Yes);
    }
}
