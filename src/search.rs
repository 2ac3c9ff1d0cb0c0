//! Search-list / ndots name expansion (spec.md §4.5 step 2), split out
//! of the query engine for clarity; grounded on the teacher's resolver
//! trying a name as-is before falling back to configured domains,
//! generalized to the full ndots-gated ordering c-ares uses (see
//! `original_source/test/ares-test-mock.cc`'s search-list cases).

/// Build the ordered sequence of fully-qualified names to try for a
/// query, given the configured search suffixes and ndots threshold.
///
/// - A name ending in `.` (or with no search list configured) is tried
///   as-is only.
/// - A name with fewer dots than `ndots` is tried with each search
///   suffix first, then bare, as a last resort.
/// - A name with at least `ndots` dots is tried bare first, then with
///   each search suffix.
pub fn expansion_order(name: &str, search: &[String], ndots: u32) -> Vec<String> {
    if name.ends_with('.') {
        return vec![name.trim_end_matches('.').to_string()];
    }
    if search.is_empty() {
        return vec![name.to_string()];
    }

    let dots = name.matches('.').count() as u32;
    let with_suffixes: Vec<String> = search.iter().map(|s| format!("{name}.{s}")).collect();

    if dots >= ndots {
        let mut order = vec![name.to_string()];
        order.extend(with_suffixes);
        order
    } else {
        let mut order = with_suffixes;
        order.push(name.to_string());
        order
    }
}
