//! Property tests for the prediction metrics.

use gibbsmf_train::{calc_auc, ResultItem};
use proptest::prelude::*;

fn item(score: f64, positive: bool) -> ResultItem {
    ResultItem {
        coords: vec![0, 0],
        val: if positive { 1.0 } else { 0.0 },
        pred_1sample: score,
        pred_avg: score,
        var: 0.0,
    }
}

fn labeled_scores() -> impl Strategy<Value = Vec<(f64, bool)>> {
    prop::collection::vec((-50.0f64..50.0, any::<bool>()), 2..60)
        .prop_filter("needs both classes", |v| {
            v.iter().any(|(_, l)| *l) && v.iter().any(|(_, l)| !*l)
        })
}

proptest! {
    #[test]
    fn auc_stays_within_the_unit_interval(scores in labeled_scores()) {
        let items: Vec<ResultItem> =
            scores.iter().map(|&(s, l)| item(s, l)).collect();
        let auc = calc_auc(&items, |i| i.pred_1sample, 0.5);
        prop_assert!((0.0..=1.0).contains(&auc));
    }

    #[test]
    fn auc_is_invariant_under_monotone_rescaling(scores in labeled_scores()) {
        let items: Vec<ResultItem> =
            scores.iter().map(|&(s, l)| item(s, l)).collect();
        let rescaled: Vec<ResultItem> = scores
            .iter()
            .map(|&(s, l)| item(3.0 * s + 7.0, l))
            .collect();
        let a = calc_auc(&items, |i| i.pred_1sample, 0.5);
        let b = calc_auc(&rescaled, |i| i.pred_1sample, 0.5);
        // ranking is unchanged, so the statistic is bit-identical
        prop_assert_eq!(a, b);
    }

    #[test]
    fn auc_of_a_perfect_ranking_is_one(neg in 1usize..20, pos in 1usize..20) {
        let mut items = Vec::new();
        for i in 0..neg {
            items.push(item(i as f64, false));
        }
        for i in 0..pos {
            items.push(item(1000.0 + i as f64, true));
        }
        let auc = calc_auc(&items, |i| i.pred_1sample, 0.5);
        prop_assert_eq!(auc, 1.0);
    }
}
