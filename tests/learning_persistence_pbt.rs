//! Property tests for the learning engine's persisted state and config validation.
//!
//! - Round trip: to_json -> from_json preserves every counter, map and timestamp
//! - Decay idempotence: a second apply_decay at the same instant changes nothing
//! - Random generation always yields valid tokens of the requested length
//! - Learning-rate and hybrid-weight validation accept exactly the valid inputs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use seedscan::learning::{
    AdvancedLearningState, BasicLearningState, Currency, HybridWeights, HybridWeightsUpdate,
    LearningToggles, Phrase, ResolvedStrategy, Strategy as GenStrategy, WordCount,
};
use seedscan::services::StrategyController;
use seedscan::store::MemoryStore;
use seedscan::Wordlist;

// ============================================================================
// Generators
// ============================================================================

fn arb_word_count() -> impl Strategy<Value = WordCount> {
    prop_oneof![Just(WordCount::Twelve), Just(WordCount::TwentyFour)]
}

fn arb_currency() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::Btc), Just(Currency::Eth), Just(Currency::Ltc)]
}

/// Small index range so phrases share words and the tables get real overlap.
fn arb_phrase() -> impl Strategy<Value = Phrase> {
    arb_word_count().prop_flat_map(|wc| {
        prop::collection::vec(0usize..64, wc.get()).prop_map(|idx| {
            let list = Wordlist::bip39_english();
            let words = idx
                .into_iter()
                .map(|i| list.get(i).unwrap().to_string())
                .collect();
            Phrase::new(words).unwrap()
        })
    })
}

fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000_000i64..1_800_000_000_000i64)
        .prop_map(|ms| DateTime::from_timestamp_millis(ms).unwrap())
}

fn arb_learn_events() -> impl Strategy<Value = Vec<(Phrase, Currency, u32, DateTime<Utc>)>> {
    prop::collection::vec((arb_phrase(), arb_currency(), 0u32..100_000, arb_time()), 0..12)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Round trips
// ============================================================================

proptest! {
    #[test]
    fn prop_basic_state_round_trip(events in arb_learn_events(), attempts in 0u64..1_000_000) {
        let mut state = BasicLearningState::new();
        for (phrase, _, _, at) in &events {
            state.learn_with(phrase, LearningToggles::default(), *at);
        }
        state.record_attempts(attempts);

        let restored = BasicLearningState::from_json(&state.to_json()).unwrap();
        prop_assert_eq!(restored, state);
    }

    #[test]
    fn prop_advanced_state_round_trip(events in arb_learn_events(), attempts in 0u64..1_000_000) {
        let mut state = AdvancedLearningState::new();
        for (phrase, currency, usd, at) in &events {
            state.learn_advanced_at(phrase, *currency, *usd as f64, *at);
        }
        state.record_attempts(attempts);

        // Re-encode through a string, the way the store sees it.
        let raw = state.to_json().to_string();
        let restored =
            AdvancedLearningState::from_json(&serde_json::from_str(&raw).unwrap()).unwrap();

        prop_assert_eq!(&restored.bigrams, &state.bigrams);
        prop_assert_eq!(&restored.trigrams, &state.trigrams);
        prop_assert_eq!(&restored.quadgrams, &state.quadgrams);
        prop_assert_eq!(&restored.first_word_frequency, &state.first_word_frequency);
        prop_assert_eq!(&restored.last_word_frequency, &state.last_word_frequency);
        prop_assert_eq!(&restored.checksum_patterns, &state.checksum_patterns);
        prop_assert_eq!(&restored.position_frequency, &state.position_frequency);
        prop_assert_eq!(&restored.pattern_ages, &state.pattern_ages);
        prop_assert_eq!(&restored.word_length_distribution, &state.word_length_distribution);
        prop_assert_eq!(&restored.success_by_word_count, &state.success_by_word_count);
        prop_assert_eq!(&restored.recent_successes, &state.recent_successes);
        prop_assert_eq!(restored.total_successes, state.total_successes);
        prop_assert_eq!(restored.total_attempts, state.total_attempts);
        prop_assert_eq!(restored.last_updated, state.last_updated);
        for (pattern, score) in &state.pattern_scores {
            prop_assert!((restored.pattern_scores[pattern] - score).abs() < 1e-9);
        }
        prop_assert!((restored.phrase_entropy - state.phrase_entropy).abs() < 1e-9);
        prop_assert!((restored.average_word_length - state.average_word_length).abs() < 1e-9);
    }

    #[test]
    fn prop_decay_idempotent(events in arb_learn_events(), later_days in 0i64..400) {
        let mut state = AdvancedLearningState::new();
        for (phrase, currency, usd, at) in &events {
            state.learn_advanced_at(phrase, *currency, *usd as f64, *at);
        }
        let now = state.last_updated.unwrap_or_else(Utc::now) + Duration::days(later_days);

        state.apply_decay(now);
        let once = state.clone();
        state.apply_decay(now);
        prop_assert_eq!(state.clone(), once);

        prop_assert!(state.pattern_scores.values().all(|s| *s >= state.config.decay_floor));
        prop_assert_eq!(state.pattern_scores.len(), state.pattern_ages.len());
    }

    #[test]
    fn prop_random_generation_valid(wc in arb_word_count(), seed in any::<u64>()) {
        let list = Wordlist::bip39_english();
        let mut rng = StdRng::seed_from_u64(seed);
        let phrase = BasicLearningState::new().generate_resolved(
            ResolvedStrategy::Random,
            wc,
            &HybridWeights::default(),
            &list,
            &mut rng,
        );
        prop_assert_eq!(phrase.len(), wc.get());
        prop_assert!(phrase.words().iter().all(|w| list.contains(w)));
    }

    #[test]
    fn prop_learned_generation_valid(
        events in arb_learn_events(),
        wc in arb_word_count(),
        seed in any::<u64>(),
    ) {
        let list = Wordlist::bip39_english();
        let mut basic = BasicLearningState::new();
        let mut advanced = AdvancedLearningState::new();
        for (phrase, currency, usd, at) in &events {
            basic.learn_with(phrase, LearningToggles::default(), *at);
            advanced.learn_advanced_at(phrase, *currency, *usd as f64, *at);
        }
        let config = Default::default();
        let mut rng = StdRng::seed_from_u64(seed);
        for strategy in GenStrategy::all() {
            let p = basic.generate(*strategy, wc, &config, &list, &mut rng);
            prop_assert_eq!(p.len(), wc.get());
            let q = advanced.generate_with_ngrams(wc, *strategy, &list, &mut rng);
            prop_assert_eq!(q.len(), wc.get());
            prop_assert!(q.words().iter().all(|w| list.contains(w)));
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_learning_rate_validation(rate in -2.0f64..3.0) {
        let rt = runtime();
        let controller = StrategyController::new(Arc::new(MemoryStore::new()));
        let before = rt.block_on(controller.config()).learning_rate;
        let result = rt.block_on(controller.set_learning_rate(rate));
        let after = rt.block_on(controller.config()).learning_rate;
        if (0.0..=1.0).contains(&rate) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(after, rate);
        } else {
            prop_assert!(result.unwrap_err().is_validation());
            prop_assert_eq!(after, before);
        }
    }

    #[test]
    fn prop_hybrid_weights_validation(p in 0.0f64..1.0, c in 0.0f64..1.0, f in 0.0f64..1.0) {
        let rt = runtime();
        let controller = StrategyController::new(Arc::new(MemoryStore::new()));
        let update = HybridWeightsUpdate {
            positional: Some(p),
            correlation: Some(c),
            frequency: Some(f),
        };
        let result = rt.block_on(controller.set_hybrid_weights(update));
        let stored = rt.block_on(controller.config()).hybrid_weights;
        if ((p + c + f) - 1.0).abs() <= 0.01 {
            prop_assert!(result.is_ok());
            let expected = HybridWeights {
                positional: p,
                correlation: c,
                frequency: f,
            };
            prop_assert_eq!(stored, expected);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(stored, HybridWeights::default());
        }
    }

    #[test]
    fn prop_valid_hybrid_weights_accepted(p in 0.0f64..=1.0, split in 0.0f64..=1.0) {
        let c = (1.0 - p) * split;
        let f = 1.0 - p - c;
        let rt = runtime();
        let controller = StrategyController::new(Arc::new(MemoryStore::new()));
        let update = HybridWeightsUpdate {
            positional: Some(p),
            correlation: Some(c),
            frequency: Some(f.max(0.0)),
        };
        prop_assert!(rt.block_on(controller.set_hybrid_weights(update)).is_ok());
    }
}
