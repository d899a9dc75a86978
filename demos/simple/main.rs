use ruleflow::{AutomationRule, ChannelEvent, ChannelOptions, Config, TrackerBuilder, TriggerSource};
use serde_json::json;

fn main() {
    let config_str = include_str!("./config.toml");

    let config = Config::load_from_str(config_str).unwrap();

    let tracker = TrackerBuilder::new().config(config).build().unwrap();

    tracker.launch();

    let text = include_str!("./rule.json");

    let rule = AutomationRule::from_json(text).unwrap();

    let report = ruleflow::validate(&rule);
    for warning in report.warnings.iter() {
        println!("Warning: {}", warning);
    }

    tracker.save_rule(&rule).unwrap();

    ChannelEvent::channel(tracker.channel(), ChannelOptions::with_rule_id(&rule.id)).unwrap().on_complete(move |run_id| {
        println!("Run completed, id: {}", run_id);
    });

    ChannelEvent::channel(tracker.channel(), ChannelOptions::with_rule_id(&rule.id)).unwrap().on_error(move |e| {
        println!("Run failed: {:?}", e);
    });

    let trigger = TriggerSource::device_event("boiler-1", json!({ "temperature": 850, "pressure": 9.5 }));
    let run = tracker.start_run(&rule.id, trigger).unwrap();

    println!("Run finished: {}", run.wait().as_ref());

    let execution = tracker.find_execution(run.id()).unwrap();
    println!("Execution: {}", serde_json::to_string_pretty(&execution).unwrap());

    let metrics = tracker.get_metrics(None).unwrap();
    println!("Metrics: {:#?}", metrics);

    tracker.shutdown();
}
