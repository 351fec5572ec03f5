//! Bipolar pair labels derived from the labels of the pair's two contacts.

use tracing::warn;

use crate::error::{LocalizeError, Result};
use crate::store::LocalizationStore;


/// The label of a pair whose contacts carry `first` and `second`.
///
/// Equal labels are kept and a missing or empty label defers to the other contact. Returns `None` if neither
/// contact is labeled or the two labels differ.
pub fn resolve_pair_label(first: Option<&str>, second: Option<&str>) -> Option<String> {
    let first = first.filter(|l| !l.is_empty());
    let second = second.filter(|l| !l.is_empty());
    match (first, second) {
        (Some(a), Some(b)) if a == b => Some(a.to_string()),
        (Some(_), Some(_)) => None,
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}


/// Set the `atlas` label of every pair from its contacts' labels and return the number of labeled pairs.
///
/// Pairs with unknown contacts are skipped with a warning, pairs without any contact label are left unlabeled.
pub fn apply_pair_labels<S: LocalizationStore + ?Sized>(store: &mut S, atlas: &str) -> Result<usize> {
    let mut labeled = 0;
    for pair in store.get_pairs() {
        let labels = store
            .get_contact_label(atlas, &pair.0)
            .and_then(|first| store.get_contact_label(atlas, &pair.1).map(|second| (first, second)));
        let (first, second) = match labels {
            Ok(labels) => labels,
            Err(LocalizeError::InvalidContact(name)) => {
                warn!("Skipping {} label of pair {}-{}: invalid contact {}", atlas, pair.0, pair.1, name);
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(label) = resolve_pair_label(first.as_deref(), second.as_deref()) {
            store.set_pair_label(atlas, &pair, &label)?;
            labeled += 1;
        }
    }
    Ok(labeled)
}
