/// Recent Changes Example
///
/// This example demonstrates:
/// - Highlighting recently changed cells and rows
/// - Driving expiry from a host-controlled clock
/// - Loading the view configuration from JSON

use livegrid::{
    EventRecorder, Field, FieldValue, ManualClock, RecentChangeKind, VecRecordStore, ViewAdapter,
    ViewConfig, ViewEvent,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Sensor {
    name: &'static str,
    reading: Cell<i64>,
}

const NAME: usize = 0;
const READING: usize = 1;

fn describe(view: &ViewAdapter<VecRecordStore<Sensor>>) {
    for row in 0..view.row_count() {
        let marker = match view.row_recent_change(row) {
            Some(RecentChangeKind::Inserted) => " [new]",
            Some(RecentChangeKind::Updated) => " [updated]",
            Some(RecentChangeKind::AllChanged) => " [refreshed]",
            _ if view.is_cell_recently_changed(READING, row) => " [reading changed]",
            _ => "",
        };
        println!(
            "   {:<8} {:>5}{}",
            view.get_value(NAME, row),
            view.get_value(READING, row),
            marker
        );
    }
    match view.next_tick_due() {
        Some(due) => println!("   next expiry at {} ms\n", due),
        None => println!("   nothing to expire\n"),
    }
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    println!("=== LiveGrid Recent Changes Example ===\n");

    // 1. Configuration from JSON; unspecified settings keep their defaults
    let config = match ViewConfig::from_json(
        r#"{ "recent_changes": { "value_changed_ms": 500, "inserted_ms": 1500 } }"#,
    ) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    println!("1. Configuration:\n{}\n", config.to_json().unwrap_or_default());

    let store = Rc::new(RefCell::new(VecRecordStore::from_records(vec![
        Sensor { name: "boiler", reading: Cell::new(71) },
        Sensor { name: "intake", reading: Cell::new(18) },
        Sensor { name: "exhaust", reading: Cell::new(240) },
    ])));
    let fields = vec![
        Field::new("name").with_value(|s: &Sensor| FieldValue::String(s.name.to_string())),
        Field::new("reading")
            .with_value(|s: &Sensor| FieldValue::Int64(s.reading.get()))
            .ordered_by_value(),
    ];

    let clock = Rc::new(ManualClock::new(0));
    let mut view = match ViewAdapter::new(store.clone(), fields, config) {
        Ok(view) => view.with_clock(clock.clone()),
        Err(e) => {
            eprintln!("Failed to create view: {}", e);
            return;
        }
    };
    let recorder = EventRecorder::new();
    let events = recorder.log();
    view.set_listener(Box::new(recorder));

    // 2. A reading changes and a sensor comes online
    println!("2. t=0: intake reads 21, vent comes online");
    if let Some(intake) = store.borrow().get(1) {
        intake.reading.set(21);
    }
    view.invalidate_value(1, READING, true);
    let index = store.borrow_mut().push(Sensor { name: "vent", reading: Cell::new(30) });
    view.record_inserted(index, true);
    describe(&view);

    // 3. Let time pass; the host ticks whenever the view says it is due
    for now in [400, 500, 1499, 1500] {
        clock.set(now);
        events.borrow_mut().clear();
        let expired = view.tick();
        println!("3. t={}: tick {}", now, if expired { "expired markers" } else { "had nothing to do" });
        for event in events.borrow().iter().filter(|e| !matches!(e, ViewEvent::BeginChange | ViewEvent::EndChange)) {
            println!("   repaint: {:?}", event);
        }
        describe(&view);
    }

    println!("=== Done ===");
}
