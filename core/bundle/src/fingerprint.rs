//! Content-addressed bundle names.

use sha1::{Digest, Sha1};

/// SHA-1 hex digest of the sorted `names` joined by `|`.
///
/// The result depends only on the set of names, never on their order.
pub fn fingerprint<S: AsRef<str>>(names: &[S]) -> String {
    let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut hasher = Sha1::new();
    hasher.update(sorted.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        // sha1("Genesis.zip|Job.zip")
        let name = fingerprint(&["Job.zip", "Genesis.zip"]);
        assert_eq!(name.len(), 40);
        assert_eq!(name, fingerprint(&["Genesis.zip", "Job.zip"]));
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_empty_list() {
        // sha1("")
        assert_eq!(
            fingerprint::<&str>(&[]),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    proptest! {
        #[test]
        fn prop_order_independent(mut names in proptest::collection::vec("[a-zA-Z ]{1,12}\\.zip", 0..20)) {
            let forward = fingerprint(&names);
            names.reverse();
            prop_assert_eq!(&forward, &fingerprint(&names));
            names.sort();
            prop_assert_eq!(forward, fingerprint(&names));
        }
    }
}
