//! Stepped workflows under a file-loaded configuration

use crate::common::Recorder;
use futures::stream;
use serde_json::{json, Value};
use transact::{
    steps, CoreConfig, Error, Perform, Result, Step, TransactionSet, CONFIG_FILE_NAME,
};

fn configured_set(step_limit: usize) -> TransactionSet {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    CoreConfig {
        step_limit,
        ..CoreConfig::default()
    }
    .write_to_file(&path)
    .unwrap();

    let config = CoreConfig::from_file(&path).unwrap();
    assert_eq!(config.step_limit, step_limit);

    TransactionSet::builder()
        .config(config)
        .handler(
            "spin",
            Perform::stepped(|_, params| {
                let pulls = params.first().and_then(Value::as_u64).unwrap_or(u64::MAX);
                let mut pulled = 0;
                Ok(move || -> Result<Step> {
                    pulled += 1;
                    if pulled > pulls {
                        Ok(Step::done(pulled - 1))
                    } else {
                        Ok(Step::state("performed"))
                    }
                })
            }),
        )
        .handler(
            "import",
            Perform::stepped(|_, params| {
                let rows = params.len();
                Ok(steps(vec![
                    Ok(Step::state("validated")),
                    Ok(Step::state("expanded")),
                    Ok(Step::done(rows)),
                ]))
            }),
        )
        .build()
        .unwrap()
}

#[test]
fn runaway_workflow_hits_configured_limit() {
    let set = configured_set(3);

    let err = set.do_action("spin", Vec::new()).unwrap_err();
    assert_eq!(err, Error::RunawaySteps { limit: 3 });
    assert_eq!(err.to_string(), "generator long loop (>3)");
    assert!(set.live().is_empty());
}

#[test]
fn workflow_within_limit_finishes() {
    let set = configured_set(3);
    // three yields, then the fourth pull is refused before it happens
    let err = set.do_action("spin", vec![json!(3)]).unwrap_err();
    assert_eq!(err, Error::RunawaySteps { limit: 3 });

    let value = set
        .do_action("spin", vec![json!(2)])
        .unwrap()
        .into_ready()
        .unwrap();
    assert_eq!(value, json!(2));
}

#[test]
fn import_states_are_observable() {
    let set = configured_set(20);
    let recorder = Recorder::attach(&set);

    let value = set
        .do_action("import", vec![json!("a"), json!("b")])
        .unwrap()
        .into_ready()
        .unwrap();
    assert_eq!(value, json!(2));

    assert_eq!(
        recorder.history(),
        json!([
            [],
            [{"action": "import", "params": ["a", "b"], "state": "new"}],
            [{"action": "import", "params": ["a", "b"], "state": "validated"}],
            [{"action": "import", "params": ["a", "b"], "state": "expanded"}],
            [],
        ])
    );
}

#[tokio::test]
async fn async_import_streams_steps() {
    let set = TransactionSet::new();
    set.add_handler(
        "import",
        Perform::stepped_async(|_, params| {
            let rows = params.len();
            Ok(stream::iter(vec![
                Ok::<_, Error>(Step::state("validated")),
                Ok(Step::pause()),
                Ok(Step::done(rows)),
            ]))
        })
        .into(),
    )
    .unwrap();

    let outcome = set.do_action("import", vec![json!(1)]).unwrap();
    assert!(outcome.is_pending());
    assert_eq!(outcome.resolve().await.unwrap(), json!(1));
    assert!(set.live().is_empty());
}
