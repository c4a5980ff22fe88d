mod common;

use common::{ScriptedEvaluator, ScriptedModel, ScriptedSource};
use showtell_training::{EvalOptions, ImageBudget, LanguageEvaluator, Split, eval_split};
use std::collections::VecDeque;

fn options(max_images: ImageBudget) -> EvalOptions {
    EvalOptions { split: Split::Val, max_images, language_eval: false, dataset: "coco".to_string(), verbose: false }
}

#[test]
fn test_budget_stops_after_enough_images() {
    let mut source = ScriptedSource::new(3, 0, 10);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);

    let result = eval_split(&mut model, &mut source, None, &options(ImageBudget::Limit(4))).unwrap();

    assert_eq!(source.fetched(Split::Val), 2);
    assert_eq!(result.predictions.len(), 6);
}

#[test]
fn test_unbounded_budget_stops_at_wrap() {
    for budget in [ImageBudget::All, ImageBudget::Limit(100)] {
        let mut source = ScriptedSource::new(3, 0, 10);
        let mut model = ScriptedModel::with_eval_losses(&[1.0]);

        let result = eval_split(&mut model, &mut source, None, &options(budget)).unwrap();

        // 10 images in batches of 3: the fourth batch wraps.
        assert_eq!(source.fetched(Split::Val), 4, "{budget:?}");
        assert_eq!(result.predictions.len(), 12);
        assert_eq!(result.predictions[9].image_id, 9);
        assert_eq!(result.predictions[10].image_id, 0);
    }
}

#[test]
fn test_budget_equal_to_split_size() {
    let mut source = ScriptedSource::new(3, 0, 6);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);

    let result = eval_split(&mut model, &mut source, None, &options(ImageBudget::Limit(6))).unwrap();

    assert_eq!(source.fetched(Split::Val), 2);
    assert_eq!(result.predictions.len(), 6);
}

#[test]
fn test_mean_loss_averages_batches() {
    let mut source = ScriptedSource::new(1, 0, 3);
    let mut model = ScriptedModel::with_eval_losses(&[1.0, 2.0, 4.0]);

    let result = eval_split(&mut model, &mut source, None, &options(ImageBudget::All)).unwrap();

    assert!((result.mean_loss - 7.0 / 3.0).abs() < 1e-12);
    assert!((result.score(None).unwrap() + 7.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_evaluation_restarts_from_first_image() {
    let mut source = ScriptedSource::new(2, 0, 4);
    source.cursors.insert(Split::Val, 3);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);

    let result = eval_split(&mut model, &mut source, None, &options(ImageBudget::Limit(2))).unwrap();

    let ids: Vec<u64> = result.predictions.iter().map(|p| p.image_id).collect();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn test_language_metrics_are_attached() {
    let mut source = ScriptedSource::new(2, 0, 4);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);
    let mut evaluator = ScriptedEvaluator { cider: VecDeque::from(vec![0.75]) };
    let opts = EvalOptions { language_eval: true, ..options(ImageBudget::All) };

    let result =
        eval_split(&mut model, &mut source, Some(&mut evaluator as &mut dyn LanguageEvaluator), &opts).unwrap();

    let stats = result.lang_stats.clone().unwrap();
    assert!((stats["count"] - 4.0).abs() < 1e-12);
    assert!((result.score(Some("CIDEr")).unwrap() - 0.75).abs() < 1e-12);
    assert!(result.score(Some("METEOR")).is_err());
}

#[test]
fn test_language_eval_without_evaluator_fails() {
    let mut source = ScriptedSource::new(2, 0, 4);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);
    let opts = EvalOptions { language_eval: true, ..options(ImageBudget::All) };

    assert!(eval_split(&mut model, &mut source, None, &opts).is_err());
}

#[test]
fn test_empty_split_is_an_error() {
    let mut source = ScriptedSource::new(2, 5, 0);
    let mut model = ScriptedModel::with_eval_losses(&[1.0]);

    assert!(eval_split(&mut model, &mut source, None, &options(ImageBudget::All)).is_err());
}
