//! Property-based tests for the incremental operators.
//!
//! These tests verify that replaying any interleaving of additions and
//! deletions leaves the same net result as evaluating the final dataset in
//! one batch, across every numeric family and mixed literal kinds.

use futures::executor::block_on;
use futures::StreamExt;
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tributary_core::{
    compare_terms, default_comparator, variables, Bindings, CanonicalHasher, Error, Term,
};
use tributary_incremental::aggregate::{Average, Extremum, GroupConcat, Sum};
use tributary_incremental::{
    from_rows, AggregateExpression, AggregateFunction, DiffRow, DistinctFilter, GroupBy,
    HashJoinState, JoinSide, OrderedSlice, SliceStrategy, SliceWindow, StandardAggregatorFactory,
    TermAggregator, UnorderedSlice,
};

/// (join key, payload, deleted later)
type SideRow = (i64, i64, bool);

fn side_strategy(max_rows: usize) -> impl Strategy<Value = Vec<SideRow>> {
    prop::collection::vec((0i64..4, 0i64..5, any::<bool>()), 0..max_rows)
}

fn side_row(var: &str, &(key, payload, _): &SideRow) -> Bindings {
    Bindings::from([("k", Term::integer(key)), (var, Term::integer(payload))])
}

/// All additions of a side, then its deletions.
fn side_events(rows: &[SideRow], var: &str) -> VecDeque<DiffRow> {
    let mut events: VecDeque<DiffRow> =
        rows.iter().map(|r| DiffRow::addition(side_row(var, r))).collect();
    events.extend(rows.iter().filter(|r| r.2).map(|r| DiffRow::deletion(side_row(var, r))));
    events
}

/// Merges two event queues, picking a side per bit.
fn interleave(
    mut left: VecDeque<DiffRow>,
    mut right: VecDeque<DiffRow>,
    bits: &[bool],
) -> Vec<(JoinSide, DiffRow)> {
    let mut out = Vec::new();
    let mut bits = bits.iter().copied();
    while !left.is_empty() || !right.is_empty() {
        let take_left = match bits.next() {
            Some(bit) => (bit && !left.is_empty()) || right.is_empty(),
            None => !left.is_empty(),
        };
        if take_left {
            out.extend(left.pop_front().map(|d| (JoinSide::Left, d)));
        } else {
            out.extend(right.pop_front().map(|d| (JoinSide::Right, d)));
        }
    }
    out
}

fn net(diffs: impl IntoIterator<Item = DiffRow>) -> HashMap<Bindings, i64> {
    let mut out = HashMap::new();
    for d in diffs {
        *out.entry(d.bindings.clone()).or_insert(0) += d.diff();
    }
    out.retain(|_, n| *n != 0);
    out
}

fn batch_join(left: &[SideRow], right: &[SideRow]) -> HashMap<Bindings, i64> {
    let mut out = HashMap::new();
    for l in left.iter().filter(|r| !r.2) {
        for r in right.iter().filter(|r| !r.2) {
            if l.0 == r.0 {
                let merged = side_row("l", l).merge(&side_row("r", r)).unwrap();
                *out.entry(merged).or_insert(0) += 1;
            }
        }
    }
    out
}

fn run_join(events: &[(JoinSide, DiffRow)]) -> (HashMap<Bindings, i64>, HashJoinState) {
    let mut join = HashJoinState::new(variables(&["k"]), CanonicalHasher::shared());
    let mut output = Vec::new();
    for (side, diff) in events {
        output.extend(join.on_diff(*side, diff).unwrap());
    }
    (net(output), join)
}

/// Multiples of 0.25, exact in every numeric family.
fn quarter(q: i64) -> String {
    (q as f64 / 4.0).to_string()
}

fn numeric_strategy() -> impl Strategy<Value = Term> {
    prop_oneof![
        (-20i64..20).prop_map(Term::from),
        (-80i64..80).prop_map(|q| Term::decimal(quarter(q))),
        (-80i64..80).prop_map(|q| Term::float(quarter(q))),
        (-80i64..80).prop_map(|q| Term::double(quarter(q))),
        prop::sample::select(vec!["INF", "-INF", "NaN"]).prop_map(|v| Term::double(v)),
        prop::sample::select(vec!["INF", "-INF"]).prop_map(|v| Term::float(v)),
    ]
}

fn literal_strategy() -> impl Strategy<Value = Term> {
    prop_oneof![
        numeric_strategy(),
        (0i64..20).prop_map(|v| Term::string(v.to_string())),
        "[a-c]{0,2}".prop_map(|v| Term::string(v)),
        ("[a-c]{1,2}", prop::sample::select(vec!["en", "fr"])).prop_map(|(v, l)| Term::lang(v, l)),
    ]
}

/// Largest (or smallest) term under the default ordering.
fn extreme(terms: &[Term], max: bool) -> Option<Term> {
    let best = if max {
        terms.iter().max_by(|a, b| compare_terms(a, b))
    } else {
        terms.iter().min_by(|a, b| compare_terms(a, b))
    };
    best.cloned()
}

proptest! {
    /// Property: the default term order is a total order agreeing with `Eq`.
    #[test]
    fn default_term_order_is_total(
        a in literal_strategy(),
        b in literal_strategy(),
        c in literal_strategy(),
    ) {
        let ab = compare_terms(&a, &b);
        let bc = compare_terms(&b, &c);
        prop_assert_eq!(ab, compare_terms(&b, &a).reverse());
        prop_assert_eq!(ab == Ordering::Equal, a == b);
        if ab != Ordering::Greater && bc != Ordering::Greater {
            prop_assert_ne!(compare_terms(&a, &c), Ordering::Greater);
        }
    }

    /// Property: MIN/MAX over mixed literals survive any removal order.
    #[test]
    fn extremum_put_remove_over_mixed_literals(
        values in prop::collection::vec((literal_strategy(), any::<bool>(), any::<u32>()), 1..12),
        max in any::<bool>(),
    ) {
        let mut extremum = if max {
            Extremum::max(default_comparator())
        } else {
            Extremum::min(default_comparator())
        };
        for (term, _, _) in &values {
            extremum.put_term(term).unwrap();
        }
        let all: Vec<Term> = values.iter().map(|v| v.0.clone()).collect();
        prop_assert_eq!(extremum.result().unwrap(), extreme(&all, max));

        let mut removals: Vec<usize> = (0..values.len()).filter(|&i| values[i].1).collect();
        removals.sort_by_key(|&i| values[i].2);
        let mut live = vec![true; values.len()];
        for i in removals {
            extremum.remove_term(&values[i].0).unwrap();
            live[i] = false;
            let remaining: Vec<Term> = all
                .iter()
                .zip(&live)
                .filter(|(_, l)| **l)
                .map(|(t, _)| t.clone())
                .collect();
            match extreme(&remaining, max) {
                Some(expected) => prop_assert_eq!(extremum.result().unwrap(), Some(expected)),
                None => prop_assert!(matches!(
                    extremum.result(),
                    Err(Error::EmptyAggregateExpression { .. })
                ), "expected EmptyAggregateExpression error"),
            }
        }
    }

    /// Property: SUM and AVG over mixed numeric families equal batch evaluation,
    /// and a put followed by a remove leaves the result unchanged.
    #[test]
    fn sum_and_avg_over_numeric_families_equal_batch(
        values in prop::collection::vec((numeric_strategy(), any::<bool>()), 0..20),
        extra in numeric_strategy(),
    ) {
        let (mut sum, mut avg) = (Sum::new(), Average::new());
        for (term, _) in &values {
            sum.put_term(term).unwrap();
            avg.put_term(term).unwrap();
        }
        for (term, deleted) in &values {
            if *deleted {
                sum.remove_term(term).unwrap();
                avg.remove_term(term).unwrap();
            }
        }

        let (mut batch_sum, mut batch_avg) = (Sum::new(), Average::new());
        for (term, _) in values.iter().filter(|(_, d)| !d) {
            batch_sum.put_term(term).unwrap();
            batch_avg.put_term(term).unwrap();
        }
        prop_assert_eq!(sum.result().unwrap(), batch_sum.result().unwrap());
        prop_assert_eq!(avg.result().unwrap(), batch_avg.result().unwrap());

        let before = (sum.result().unwrap(), avg.result().unwrap());
        sum.put_term(&extra).unwrap();
        avg.put_term(&extra).unwrap();
        sum.remove_term(&extra).unwrap();
        avg.remove_term(&extra).unwrap();
        prop_assert_eq!((sum.result().unwrap(), avg.result().unwrap()), before);
    }

    /// Property: GROUP_CONCAT holds exactly the live values and their shared tag.
    #[test]
    fn group_concat_interleaving_equals_batch(
        values in prop::collection::vec(
            ("[a-c]{1,2}", prop::option::of(prop::sample::select(vec!["en", "fr"])), any::<bool>()),
            0..15,
        ),
    ) {
        let term = |v: &str, lang: Option<&str>| match lang {
            Some(lang) => Term::lang(v, lang),
            None => Term::string(v),
        };
        let mut concat = GroupConcat::new(",");
        for (v, lang, _) in &values {
            concat.put_term(&term(v, *lang)).unwrap();
        }
        for (v, lang, deleted) in &values {
            if *deleted {
                concat.remove_term(&term(v, *lang)).unwrap();
            }
        }

        let live: Vec<_> = values.iter().filter(|v| !v.2).collect();
        let mut expected: Vec<&str> = live.iter().map(|v| v.0.as_str()).collect();
        expected.sort_unstable();
        let shared = match live.first() {
            Some(first) if live.iter().all(|v| v.1 == first.1) => first.1,
            _ => None,
        };

        let result = concat.result().unwrap().unwrap();
        let literal = result.as_literal().unwrap();
        let mut actual: Vec<&str> = literal.value().split(',').filter(|s| !s.is_empty()).collect();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(literal.language(), shared);
    }

    /// Property: GROUP BY with MAX and COUNT nets to the batch grouping.
    #[test]
    fn group_by_max_and_count_equal_batch(
        rows in prop::collection::vec((0i64..3, literal_strategy(), any::<bool>()), 0..16),
    ) {
        let mut events = Vec::new();
        let mut late = Vec::new();
        for (id, (group, value, deleted)) in rows.iter().enumerate() {
            let row = Bindings::from([
                ("id", Term::integer(id as i64)),
                ("g", Term::integer(*group)),
                ("v", value.clone()),
            ]);
            events.push(DiffRow::addition(row.clone()));
            if *deleted {
                late.push(DiffRow::deletion(row));
            }
        }
        events.extend(late);

        let group_by = GroupBy::new(
            from_rows(events),
            variables(&["g"]),
            vec![
                AggregateExpression::new(AggregateFunction::Max, "v".into(), "top".into()),
                AggregateExpression::new(AggregateFunction::Count, "v".into(), "n".into()),
            ],
            Arc::new(StandardAggregatorFactory::new()),
            CanonicalHasher::shared(),
        );
        let output: Vec<DiffRow> = block_on(group_by.map(|d| d.unwrap()).collect());

        let mut groups: HashMap<i64, Vec<Term>> = HashMap::new();
        for (group, value, deleted) in &rows {
            if !deleted {
                groups.entry(*group).or_default().push(value.clone());
            }
        }
        let expected: HashMap<Bindings, i64> = groups
            .into_iter()
            .map(|(g, values)| {
                let top = extreme(&values, true).unwrap();
                let row = Bindings::from([
                    ("g", Term::integer(g)),
                    ("top", top),
                    ("n", Term::integer(values.len() as i64)),
                ]);
                (row, 1)
            })
            .collect();
        prop_assert_eq!(net(output), expected);
    }

    /// Property: any interleaving of both sides nets out to the batch join.
    #[test]
    fn hash_join_interleaving_equals_batch(
        left in side_strategy(12),
        right in side_strategy(12),
        bits in prop::collection::vec(any::<bool>(), 0..48),
    ) {
        let events = interleave(side_events(&left, "l"), side_events(&right, "r"), &bits);
        let (incremental, join) = run_join(&events);

        prop_assert_eq!(incremental, batch_join(&left, &right));
        prop_assert_eq!(join.left_count(), left.iter().filter(|r| !r.2).count() as u64);
        prop_assert_eq!(join.right_count(), right.iter().filter(|r| !r.2).count() as u64);
    }

    /// Property: swapping which side an input arrives on does not change the result.
    #[test]
    fn hash_join_is_commutative(
        left in side_strategy(10),
        right in side_strategy(10),
        bits in prop::collection::vec(any::<bool>(), 0..40),
    ) {
        let events = interleave(side_events(&left, "l"), side_events(&right, "r"), &bits);
        let swapped: Vec<(JoinSide, DiffRow)> = events
            .iter()
            .map(|(side, d)| {
                let side = match side {
                    JoinSide::Left => JoinSide::Right,
                    JoinSide::Right => JoinSide::Left,
                };
                (side, d.clone())
            })
            .collect();

        prop_assert_eq!(run_join(&events).0, run_join(&swapped).0);
    }

    /// Property: adding then deleting a row restores the join memories.
    #[test]
    fn hash_join_add_then_delete_restores_state(
        left in side_strategy(10),
        extra in (0i64..4, 0i64..5),
    ) {
        let mut join = HashJoinState::new(variables(&["k"]), CanonicalHasher::shared());
        for r in &left {
            join.on_left(&DiffRow::addition(side_row("l", r))).unwrap();
        }
        let extra = side_row("r", &(extra.0, extra.1, false));

        let added = join.on_right(&DiffRow::addition(extra.clone())).unwrap();
        let removed = join.on_right(&DiffRow::deletion(extra)).unwrap();

        prop_assert_eq!(added.len(), removed.len());
        prop_assert_eq!(net(added.into_iter().chain(removed)), HashMap::new());
        prop_assert_eq!(join.right_count(), 0);
        prop_assert_eq!(join.left_count(), left.len() as u64);
    }

    /// Property: SUM over any add/remove history equals the sum of what is left.
    #[test]
    fn sum_interleaving_equals_batch(
        values in prop::collection::vec((-100i64..100, any::<bool>()), 0..30),
    ) {
        let mut sum = Sum::new();
        for (v, _) in &values {
            sum.put_term(&Term::integer(*v)).unwrap();
        }
        for (v, deleted) in &values {
            if *deleted {
                sum.remove_term(&Term::integer(*v)).unwrap();
            }
        }
        let expected: i64 = values.iter().filter(|(_, d)| !d).map(|(v, _)| v).sum();
        prop_assert_eq!(sum.result().unwrap(), Some(Term::integer(expected)));
    }

    /// Property: DISTINCT emits one net copy of every live row.
    #[test]
    fn distinct_nets_to_live_set(rows in side_strategy(20)) {
        let mut filter = DistinctFilter::distinct(CanonicalHasher::shared());
        let passed: Vec<DiffRow> = side_events(&rows, "l")
            .into_iter()
            .filter(|d| filter.run(d))
            .collect();

        let expected: HashMap<Bindings, i64> = rows
            .iter()
            .filter(|r| !r.2)
            .map(|r| (side_row("l", r), 1))
            .collect();
        prop_assert_eq!(net(passed), expected);
    }

    /// Property: GROUP BY with SUM nets to the batch grouping of live rows.
    #[test]
    fn group_by_interleaving_equals_batch(
        rows in prop::collection::vec((0i64..3, -20i64..20, any::<bool>(), any::<bool>()), 0..20),
    ) {
        // A row deleted "immediately" is retracted right after it is added
        let mut events = Vec::new();
        let mut late = Vec::new();
        for &(group, amount, deleted, immediately) in &rows {
            let row =
                Bindings::from([("g", Term::integer(group)), ("amount", Term::integer(amount))]);
            events.push(DiffRow::addition(row.clone()));
            match (deleted, immediately) {
                (true, true) => events.push(DiffRow::deletion(row)),
                (true, false) => late.push(DiffRow::deletion(row)),
                _ => {}
            }
        }
        events.extend(late);

        let group_by = GroupBy::new(
            from_rows(events),
            variables(&["g"]),
            vec![AggregateExpression::new(AggregateFunction::Sum, "amount".into(), "total".into())],
            Arc::new(StandardAggregatorFactory::new()),
            CanonicalHasher::shared(),
        );
        let output: Vec<DiffRow> = block_on(group_by.map(|d| d.unwrap()).collect());

        let mut totals: HashMap<i64, i64> = HashMap::new();
        for &(group, amount, deleted, _) in &rows {
            if !deleted {
                *totals.entry(group).or_insert(0) += amount;
            }
        }
        let expected: HashMap<Bindings, i64> = totals
            .into_iter()
            .map(|(g, t)| {
                (Bindings::from([("g", Term::integer(g)), ("total", Term::integer(t))]), 1)
            })
            .collect();
        prop_assert_eq!(net(output), expected);
    }

    /// Property: the ordered window always nets to the slice of live rows.
    #[test]
    fn ordered_slice_equals_batch_window(
        order in prop::collection::vec((any::<u32>(), any::<bool>()), 0..15),
        start in 0u64..5,
        length in prop::option::of(0u64..5),
    ) {
        let window = SliceWindow::new(start, length);
        let mut slice = OrderedSlice::new(window, CanonicalHasher::shared());
        let row = |i: usize| {
            DiffRow::addition(Bindings::from([("x", Term::integer(i as i64))])).with_order(i as u64)
        };

        // Insert in a shuffled order, then delete in index order
        let mut arrival: Vec<usize> = (0..order.len()).collect();
        arrival.sort_by_key(|&i| order[i].0);
        let mut output = VecDeque::new();
        for &i in &arrival {
            slice.apply(row(i), &mut output).unwrap();
        }
        for (i, (_, deleted)) in order.iter().enumerate() {
            if *deleted {
                slice.apply(row(i).negate(), &mut output).unwrap();
            }
        }

        let live = (0..order.len()).filter(|&i| !order[i].1);
        let expected: HashMap<Bindings, i64> = live
            .skip(start as usize)
            .take(length.map_or(usize::MAX, |l| l as usize))
            .map(|i| (row(i).bindings, 1))
            .collect();
        prop_assert_eq!(net(output), expected);
    }

    /// Property: the unordered window holds as many live rows as fit.
    #[test]
    fn unordered_slice_window_size(
        deleted in prop::collection::vec(any::<bool>(), 0..15),
        start in 0u64..5,
        length in 0u64..5,
    ) {
        let window = SliceWindow::new(start, Some(length));
        let mut slice = UnorderedSlice::new(window, CanonicalHasher::shared());
        let row = |i: usize| DiffRow::addition(Bindings::from([("x", Term::integer(i as i64))]));
        let mut output = VecDeque::new();
        for i in 0..deleted.len() {
            slice.apply(row(i), &mut output).unwrap();
        }
        for (i, d) in deleted.iter().enumerate() {
            if *d {
                slice.apply(row(i).negate(), &mut output).unwrap();
            }
        }

        let live = deleted.iter().filter(|d| !**d).count() as u64;
        let expected = live.saturating_sub(start).min(length);
        let window = net(output);
        prop_assert_eq!(window.len() as u64, expected);
        prop_assert!(window.values().all(|n| *n == 1));
        prop_assert!(window.keys().all(|b| {
            let i = match b.iter().next() {
                Some((_, Term::Literal(l))) => l.value().parse::<usize>().unwrap(),
                _ => usize::MAX,
            };
            i < deleted.len() && !deleted[i]
        }), "window contains a deleted or unknown row");
    }
}
