use std::fmt::Display;

use simple_dns::Question;

/// Cache key of a query. Derived from the question name, type and class.
/// Never contains the transaction id.
///
/// Names are compared case-sensitive unless `fold_case` is set when the key is derived.
/// DNS names are case-insensitive so `Example.com` and `example.com` end up as two
/// separate cache entries by default.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ResolutionKey {
    name: String,
    qtype: String,
    qclass: String,
}

impl ResolutionKey {
    pub fn new(name: impl Into<String>, qtype: impl Into<String>, qclass: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qtype: qtype.into(),
            qclass: qclass.into(),
        }
    }

    pub fn from_question(question: &Question, fold_case: bool) -> Self {
        let mut name = question.qname.to_string();
        if fold_case {
            name.make_ascii_lowercase();
        }
        Self::new(name, format!("{:?}", question.qtype), format!("{:?}", question.qclass))
    }

    #[cfg(test)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Approximate heap size of the key in bytes.
    pub fn memory_size(&self) -> usize {
        self.name.len() + self.qtype.len() + self.qclass.len()
    }
}

impl Display for ResolutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.qclass, self.qtype)
    }
}

#[cfg(test)]
mod tests {
    use simple_dns::{Name, Question, CLASS, QCLASS, QTYPE, TYPE};

    use super::*;

    fn question(name: &str, qtype: TYPE, qclass: CLASS) -> Question<'_> {
        Question::new(Name::new(name).unwrap(), QTYPE::TYPE(qtype), QCLASS::CLASS(qclass), false)
    }

    #[test]
    fn same_question_same_key() {
        let first = ResolutionKey::from_question(&question("example.com", TYPE::A, CLASS::IN), false);
        let second = ResolutionKey::from_question(&question("example.com", TYPE::A, CLASS::IN), false);
        assert_eq!(first, second);
    }

    #[test]
    fn any_difference_changes_the_key() {
        let base = ResolutionKey::from_question(&question("example.com", TYPE::A, CLASS::IN), false);
        let other_name = ResolutionKey::from_question(&question("example.org", TYPE::A, CLASS::IN), false);
        let other_type = ResolutionKey::from_question(&question("example.com", TYPE::AAAA, CLASS::IN), false);
        let other_class = ResolutionKey::from_question(&question("example.com", TYPE::A, CLASS::CH), false);

        assert_ne!(base, other_name);
        assert_ne!(base, other_type);
        assert_ne!(base, other_class);
    }

    #[test]
    fn fold_case_merges_names() {
        let upper = ResolutionKey::from_question(&question("Example.COM", TYPE::A, CLASS::IN), true);
        let lower = ResolutionKey::from_question(&question("example.com", TYPE::A, CLASS::IN), true);
        assert_eq!(upper, lower);
        assert!(upper.name().starts_with("example.com"));
    }

    #[test]
    fn display() {
        let key = ResolutionKey::new("example.com", "A", "IN");
        assert_eq!(key.to_string(), "example.com:IN:A");
    }
}
