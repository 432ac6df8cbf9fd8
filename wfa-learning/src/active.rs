mod lstar;
pub use lstar::*;

pub(crate) mod oracle;
pub use oracle::*;

mod cache;
pub use cache::MembershipCache;

mod closedness;
pub use closedness::*;

mod equivalence;
pub use equivalence::*;

mod hypothesis;
pub use hypothesis::*;

mod stats;
pub use stats::LearningStats;

mod observationtable;
pub use observationtable::ObservationTable;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use itertools::Itertools;
    use wfa::{
        math::vector,
        prelude::*,
        random::{generate_random_wfa, RandomWfaConfig},
    };

    use super::*;

    fn w(x: i64) -> Weight {
        Weight::from(x)
    }

    fn tripling() -> WeightedAutomaton {
        WeightedAutomaton::builder(alphabet!(simple 'a'))
            .with_weights([2])
            .with_initial([1])
            .with_transitions([(0, 'a', 0, 3)])
            .build()
            .unwrap()
    }

    fn learner(
        target: &WeightedAutomaton,
        options: LearningOptions,
    ) -> WeightedLStar<'_, ExactSolver, Bisimulation> {
        WeightedLStar::new(target, ExactSolver, Bisimulation).with_options(options)
    }

    fn assert_equivalent(left: &WeightedAutomaton, right: &WeightedAutomaton) {
        let mut cache = MembershipCache::new();
        let cex = Bisimulation
            .find_counterexample(left, right, &mut cache, &Deadline::unbounded())
            .unwrap();
        assert_eq!(cex, None, "automata differ on {:?}", cex);
    }

    #[test_log::test]
    fn plain_learning_reproduces_tripling() {
        let target = tripling();
        let learned = learner(&target, LearningOptions::plain()).infer().unwrap();
        assert_eq!(learned.size(), 1);
        assert_eq!(learned.weights(), vector([2]));
        assert_eq!(learned.initial(), vector([1]));
        assert_eq!(
            learned.transitions().collect::<Vec<_>>(),
            vec![(0, 'a', 0, w(3))]
        );
        assert_eq!(learned.member(&['a', 'a']), w(18));
        assert_eq!(target.member(&['a', 'a']), w(18));
    }

    #[test_log::test]
    fn factorized_learning_moves_weight_to_initial() {
        let target = tripling();
        let mut lstar = learner(&target, LearningOptions::default());
        let learned = lstar.infer().unwrap();
        assert_eq!(learned.size(), 1);
        assert_eq!(learned.weights(), vector([1]));
        assert_eq!(learned.initial(), vector([2]));
        assert_eq!(learned.member(&['a', 'a']), w(18));
        assert_eq!(lstar.stats().equivalence_queries, 1);
        assert!(lstar.table().is_consistent(lstar.cache()));
    }

    #[test_log::test]
    fn unreachable_states_are_not_learned() {
        let target = WeightedAutomaton::builder(alphabet!(simple 'a', 'b'))
            .with_weights([1, 5])
            .with_transitions([(0, 'a', 0, 2), (0, 'b', 0, -1), (1, 'a', 0, 7)])
            .build()
            .unwrap();
        for options in [LearningOptions::default(), LearningOptions::plain()] {
            let learned = learner(&target, options).infer().unwrap();
            assert_eq!(learned.size(), 1);
            assert_equivalent(&target, &learned);
        }
    }

    #[test_log::test]
    fn counterexamples_extend_suffixes() {
        // a^n has weight 1 for n < 2 and 0 afterwards, which needs suffixes to tell apart
        let target = WeightedAutomaton::builder(alphabet!(simple 'a'))
            .with_weights([1, 1, 0])
            .with_transitions([(0, 'a', 1, 1), (1, 'a', 2, 1)])
            .build()
            .unwrap();
        let mut lstar = learner(&target, LearningOptions::default());
        let learned = lstar.infer().unwrap();
        assert_equivalent(&target, &learned);
        assert!(lstar.stats().equivalence_queries >= 2);

        let suffixes = lstar.table().suffixes();
        assert_eq!(suffixes[0], Word::new());
        assert!(suffixes.iter().all_unique());
        // every counterexample was recorded with the weight of the target
        for (word, weight) in lstar.cache().iter() {
            assert_eq!(&target.member(word), weight);
        }
        // suffixes were added shortest first
        assert!(suffixes.windows(2).skip(1).all(|w| w[0].len() <= w[1].len()));
    }

    #[test_log::test]
    fn closing_a_closed_table_changes_nothing() {
        let target = WeightedAutomaton::builder(alphabet!(simple 'a', 'b'))
            .with_weights([3, 1])
            .with_transitions([(0, 'a', 1, 2), (1, 'b', 0, 1), (1, 'a', 1, -1)])
            .build()
            .unwrap();
        let mut lstar = learner(&target, LearningOptions::default());
        lstar.infer().unwrap();
        let prefixes = lstar.table().prefixes().to_vec();
        let first = lstar.close().unwrap();
        let second = lstar.close().unwrap();
        assert_eq!(first, second);
        assert_eq!(lstar.table().prefixes(), prefixes.as_slice());
    }

    #[test_log::test]
    fn random_targets_are_learned() {
        let mut rng = fastrand::Rng::with_seed(0xdead);
        let alphabet = alphabet!(simple 'a', 'b');
        let config = RandomWfaConfig {
            min_states: 1,
            max_states: 4,
            weights: vector([-2, -1, 1, 2, 3]),
            min_transitions: 0,
            max_transitions: 3,
        };
        for _ in 0..15 {
            let target = generate_random_wfa(&alphabet, &config, &mut rng);
            for options in [
                LearningOptions::default(),
                LearningOptions::plain(),
                LearningOptions::default().with_redundant_row_removal(false),
            ] {
                let mut lstar = learner(&target, options);
                let learned = lstar.infer().unwrap();
                assert_equivalent(&target, &learned);
                assert_eq!(learned.size(), lstar.table().size());
                assert!(lstar.table().is_consistent(lstar.cache()));
            }
        }
    }

    #[test_log::test]
    fn collapsed_hypotheses_are_correct() {
        let mut rng = fastrand::Rng::with_seed(3);
        let alphabet = alphabet!(simple 'a', 'b');
        for _ in 0..10 {
            let target = generate_random_wfa(&alphabet, &RandomWfaConfig::default(), &mut rng);
            let options = LearningOptions::default().with_basis_collapse(true);
            let learned = learner(&target, options).infer().unwrap();
            assert_equivalent(&target, &learned);
        }
    }

    #[test_log::test]
    fn random_sampling_learns_simple_targets() {
        let target = tripling();
        let oracle = RandomSampling::new(fastrand::Rng::with_seed(5));
        let learned = WeightedLStar::new(&target, ExactSolver, oracle)
            .infer()
            .unwrap();
        assert_equivalent(&target, &learned);
    }

    struct Unreachable;

    impl EquivalenceOracle for Unreachable {
        fn find_counterexample(
            &mut self,
            _target: &WeightedAutomaton,
            _hypothesis: &WeightedAutomaton,
            _cache: &mut MembershipCache,
            _deadline: &Deadline,
        ) -> Result<Option<Word>, OracleError> {
            Err(OracleError::Timeout(Duration::from_millis(1)))
        }
    }

    #[test_log::test]
    fn fallback_answers_after_timeout() {
        let target = tripling();
        let mut lstar = WeightedLStar::new(&target, ExactSolver, Unreachable).with_fallback(Bisimulation);
        let learned = lstar.infer().unwrap();
        assert_equivalent(&target, &learned);
        assert!(lstar.stats().fallbacks >= 1);

        let mut lstar = WeightedLStar::new(&target, ExactSolver, Unreachable);
        assert!(matches!(
            lstar.infer(),
            Err(LearningError::Oracle(OracleError::Timeout(_)))
        ));
    }

    struct Liar;

    impl EquivalenceOracle for Liar {
        fn find_counterexample(
            &mut self,
            _target: &WeightedAutomaton,
            _hypothesis: &WeightedAutomaton,
            _cache: &mut MembershipCache,
            _deadline: &Deadline,
        ) -> Result<Option<Word>, OracleError> {
            Ok(Some(vec!['a']))
        }
    }

    #[test]
    fn spurious_counterexamples_are_rejected() {
        let target = tripling();
        let mut lstar = WeightedLStar::new(&target, ExactSolver, Liar);
        assert!(matches!(
            lstar.infer(),
            Err(LearningError::Oracle(OracleError::SpuriousCounterexample(_)))
        ));
    }

    #[test]
    fn state_bound_is_enforced() {
        let target = WeightedAutomaton::builder(alphabet!(simple 'a'))
            .with_weights([1, 2])
            .with_transitions([(0, 'a', 1, 1)])
            .build()
            .unwrap();
        let result = learner(&target, LearningOptions::default().with_state_bound(1)).infer();
        assert!(matches!(
            result,
            Err(LearningError::NotMinimal {
                learned: 2,
                bound: 1
            })
        ));
    }

    #[test]
    fn interactive_oracles_drive_learning() {
        let target = tripling();
        let closedness = InteractiveClosedness::new("3\n".as_bytes(), Vec::new());
        let equivalence = InteractiveEquivalence::new("a\nNone\n".as_bytes(), Vec::new());
        let learned = WeightedLStar::new(&target, closedness, equivalence)
            .infer()
            .unwrap();
        assert_eq!(learned.member(&['a', 'a']), w(18));
    }

    #[test_log::test]
    fn benchmark_sized_targets_are_learned() {
        let mut rng = fastrand::Rng::with_seed(2024);
        for alphabet in [
            alphabet!(simple 'a'),
            alphabet!(simple 'a', 'b'),
            alphabet!(simple 'a', 'b', 'c'),
            alphabet!(simple 'a', 'b', 'c', 'd'),
        ] {
            for states in [1, 4, 7, 10] {
                let target =
                    generate_random_wfa(&alphabet, &RandomWfaConfig::with_states(states), &mut rng);
                let options = LearningOptions::default().with_max_rounds(10_000);
                let mut lstar = learner(&target, options);
                let learned = lstar.infer().unwrap();
                assert_equivalent(&target, &learned);
                assert!(lstar.table().is_consistent(lstar.cache()));
            }
        }
    }

    #[test_log::test]
    fn long_words_keep_exact_weights() {
        let target = WeightedAutomaton::builder(alphabet!(simple 'a', 'b'))
            .with_weights([1, 3])
            .with_transitions([(0, 'a', 0, 4), (0, 'b', 1, 4), (1, 'a', 1, 4)])
            .build()
            .unwrap();
        let learned = learner(&target, LearningOptions::default()).infer().unwrap();
        assert_equivalent(&target, &learned);

        let word = vec!['a'; 70];
        assert_eq!(learned.member(&word), w(2).pow(140));
        let mut word = vec!['a'; 35];
        word.push('b');
        word.extend(['a'; 35]);
        assert_eq!(learned.member(&word), w(3) * w(4).pow(71));
    }

    struct Stuck;

    impl ClosednessOracle for Stuck {
        fn decide(
            &mut self,
            _query: &ClosednessQuery<'_>,
            _deadline: &Deadline,
        ) -> Result<Option<Vec<Weight>>, OracleError> {
            Err(OracleError::Timeout(Duration::from_millis(1)))
        }
    }

    #[test_log::test]
    fn closedness_fallback_answers_after_timeout() {
        let target = tripling();
        let mut lstar =
            WeightedLStar::new(&target, Stuck, Bisimulation).with_closedness_fallback(ExactSolver);
        let learned = lstar.infer().unwrap();
        assert_equivalent(&target, &learned);
        assert!(lstar.stats().fallbacks >= 1);

        let mut lstar = WeightedLStar::new(&target, Stuck, Bisimulation);
        assert!(matches!(
            lstar.infer(),
            Err(LearningError::Oracle(OracleError::Timeout(_)))
        ));
    }

    #[test_log::test]
    fn closedness_fallback_covers_row_removal() {
        let mut rng = fastrand::Rng::with_seed(11);
        let alphabet = alphabet!(simple 'a', 'b');
        for _ in 0..5 {
            let target = generate_random_wfa(&alphabet, &RandomWfaConfig::default(), &mut rng);
            let mut lstar =
                WeightedLStar::new(&target, Stuck, Bisimulation).with_closedness_fallback(ExactSolver);
            let learned = lstar.infer().unwrap();
            assert_equivalent(&target, &learned);
        }
    }
}
