// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::json;

use super::*;

/// Records the labels of every job it sees, in execution order, and can be
/// told to fail a particular job.
#[derive(Clone, Default)]
struct RecordingEngine {
    seen: Rc<RefCell<Vec<String>>>,
    fail_on: Option<String>,
}

impl ExecutionEngine for RecordingEngine {
    fn execute(&mut self, batch: &[JobDescriptor]) -> Result<(), BatchError> {
        for job in batch {
            if self.fail_on.as_deref() == Some(job.label.as_str()) {
                return Err(BatchError::JobFailed {
                    label: job.label.clone(),
                    tool_id: job.tool_id.clone(),
                    status: "exit status: 1".to_string(),
                });
            }
            self.seen.borrow_mut().push(job.label.clone());
        }
        Ok(())
    }
}

fn add_job(recipe: &mut Recipe, tool: &str, label: &str) {
    let mut parameters = IndexMap::new();
    parameters.insert("msname".to_string(), json!(["target.ms"]));
    parameters.insert("niter".to_string(), json!(100_000));
    recipe.add(
        tool,
        parameters,
        Path::new("input"),
        Path::new("output"),
        label.to_string(),
    );
}

#[test]
fn run_empties_the_queue() {
    let engine = RecordingEngine::default();
    let mut recipe = Recipe::new(Box::new(engine));
    add_job(&mut recipe, "wsclean", "image_1");
    add_job(&mut recipe, "pybdsf", "extract_1");
    add_job(&mut recipe, "cubical", "calibrate_1");
    assert_eq!(recipe.len(), 3);

    recipe.run().unwrap();
    assert!(recipe.is_empty());
}

#[test]
fn jobs_are_submitted_fifo() {
    let engine = RecordingEngine::default();
    let seen = Rc::clone(&engine.seen);
    let mut recipe = Recipe::new(Box::new(engine));
    add_job(&mut recipe, "wsclean", "image_1");
    add_job(&mut recipe, "wsclean", "image_2");
    add_job(&mut recipe, "pybdsf", "extract_2");
    recipe.run().unwrap();

    assert_eq!(*seen.borrow(), vec!["image_1", "image_2", "extract_2"]);
}

#[test]
fn repeated_jobs_are_not_deduplicated() {
    let engine = RecordingEngine::default();
    let seen = Rc::clone(&engine.seen);
    let mut recipe = Recipe::new(Box::new(engine));
    add_job(&mut recipe, "wsclean", "image_1");
    add_job(&mut recipe, "wsclean", "image_1");
    recipe.run().unwrap();

    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn a_failed_batch_still_empties_the_queue() {
    let engine = RecordingEngine {
        fail_on: Some("extract_1".to_string()),
        ..Default::default()
    };
    let seen = Rc::clone(&engine.seen);
    let mut recipe = Recipe::new(Box::new(engine));
    add_job(&mut recipe, "wsclean", "image_1");
    add_job(&mut recipe, "pybdsf", "extract_1");
    add_job(&mut recipe, "cubical", "calibrate_1");

    let result = recipe.run();
    assert!(matches!(
        result,
        Err(BatchError::JobFailed { ref label, .. }) if label == "extract_1"
    ));
    // Nothing after the failing job ran, and nothing is left to re-submit.
    assert_eq!(*seen.borrow(), vec!["image_1"]);
    assert!(recipe.is_empty());

    // A later run must not resurrect the failed batch.
    recipe.run().unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn running_an_empty_recipe_is_a_no_op() {
    let engine = RecordingEngine::default();
    let mut recipe = Recipe::new(Box::new(engine));
    recipe.run().unwrap();
    assert!(recipe.is_empty());
}
