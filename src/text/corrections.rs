//! Correction tables applied by the normalizer.
//!
//! Both tables are ordered: entries are applied top to bottom, and longer
//! keys come before keys they contain.

/// A character-level OCR confusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confusion {
    /// Replace every occurrence of a substring.
    Substring {
        from: &'static str,
        to: &'static str,
    },
    /// Replace a symbol only when the run it belongs to sits between two letters.
    BetweenLetters { from: char, to: char },
    /// Collapse runs of a repeated character into one.
    CollapseRun(char),
}

/// Symbol-for-letter substitutions and doubled-letter contractions.
pub static CONFUSIONS: &[Confusion] = &[
    Confusion::Substring {
        from: "thethe",
        to: "the",
    },
    Confusion::Substring {
        from: "ththe",
        to: "the",
    },
    Confusion::BetweenLetters { from: '|', to: 'l' },
    Confusion::BetweenLetters { from: '¹', to: 'l' },
    Confusion::BetweenLetters { from: '!', to: 'i' },
    Confusion::BetweenLetters { from: '1', to: 'l' },
    Confusion::BetweenLetters { from: '0', to: 'o' },
    Confusion::CollapseRun('i'),
    Confusion::CollapseRun('u'),
];

/// Whole-word fixes for common handwriting recognition slips.
///
/// Keys are matched case-insensitively on word boundaries; a key may span
/// several words.
pub static WORD_FIXES: &[(&str, &str)] = &[
    ("ferkeepthe", "keep the"),
    ("ferkeep", "keep"),
    ("fer", "for"),
    ("thee", "the"),
    ("balace", "balance"),
    ("balence", "balance"),
    ("baleance", "balance"),
    ("ballance", "balance"),
    ("ballence", "balance"),
    ("kepthe", "keep the"),
    ("thte", "the"),
    ("tthe", "the"),
    ("kehp", "keep"),
    ("kepe", "keep"),
    ("keeep", "keep"),
    ("kepp", "keep"),
    ("keepp", "keep"),
    ("tahe", "the"),
    ("teh", "the"),
    ("hte", "the"),
    ("tokeep", "to keep"),
    ("tothe", "to the"),
    ("tto", "to"),
    ("andf", "and"),
    ("adn", "and"),
    ("annd", "and"),
    ("the the", "the"),
    ("to to", "to"),
    ("and and", "and"),
    ("is is", "is"),
    ("busines", "business"),
    ("bussiness", "business"),
    ("buisness", "business"),
    ("bussines", "business"),
    ("becuase", "because"),
    ("becaue", "because"),
    ("becausee", "because"),
    ("b ecause", "because"),
    ("recieve", "receive"),
    ("recive", "receive"),
    ("recieved", "received"),
    ("ocur", "occur"),
    ("occured", "occurred"),
    ("ocurred", "occurred"),
    ("realy", "really"),
    ("truely", "truly"),
    ("definately", "definitely"),
    ("seperate", "separate"),
    ("sepeerate", "separate"),
    ("occassion", "occasion"),
    ("occassions", "occasions"),
    ("begining", "beginning"),
    ("begininng", "beginning"),
    ("reccommend", "recommend"),
    ("recomend", "recommend"),
    ("sucess", "success"),
    ("succes", "success"),
    ("succcess", "success"),
    ("doesnt", "doesn't"),
    ("dosent", "doesn't"),
    ("cant", "can't"),
    ("wont", "won't"),
    ("shouldnt", "shouldn't"),
    ("wouldnt", "wouldn't"),
    ("im", "I'm"),
    ("thier", "their"),
    ("theyre", "they're"),
    ("youre", "you're"),
    ("hes", "he's"),
    ("shes", "she's"),
    ("weve", "we've"),
    ("youve", "you've"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_word_fix_keys_are_unique_and_lowercase() {
        let mut seen = HashSet::new();
        for (key, _) in WORD_FIXES {
            assert_eq!(*key, key.to_lowercase(), "key {key} must be lowercase");
            assert!(seen.insert(*key), "duplicate key {key}");
        }
    }

    #[test]
    fn test_word_fix_targets_are_not_keys() {
        // A target that is itself a key would make a single pass unstable.
        let keys: HashSet<&str> = WORD_FIXES.iter().map(|(k, _)| *k).collect();
        for (_, target) in WORD_FIXES {
            assert!(
                !keys.contains(target.to_lowercase().as_str()),
                "target {target} is also a key"
            );
        }
    }

    #[test]
    fn test_longer_keys_precede_their_prefixes() {
        let pos = |k: &str| WORD_FIXES.iter().position(|(key, _)| *key == k).unwrap();
        assert!(pos("ferkeepthe") < pos("ferkeep"));
        assert!(pos("ferkeep") < pos("fer"));
    }

    #[test]
    fn test_between_letter_rules_map_symbols_to_letters() {
        for rule in CONFUSIONS {
            if let Confusion::BetweenLetters { from, to } = rule {
                assert!(!from.is_alphabetic(), "{from} is already a letter");
                assert!(to.is_alphabetic(), "{to} is not a letter");
            }
        }
    }
}
