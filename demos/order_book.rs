/// Order Book Example
///
/// This example demonstrates:
/// - Building a sorted, filtered view over a record store
/// - Reporting store changes to the view incrementally
/// - Reading the resulting notifications as JSON events
/// - Switching to reversed row order

use livegrid::{
    EventRecorder, Field, FieldValue, RecordStore, SortFieldSpecifier, VecRecordStore, ViewAdapter,
    ViewConfig,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Order {
    trader: &'static str,
    price: Cell<f64>,
    size: Cell<i64>,
}

impl Order {
    fn new(trader: &'static str, price: f64, size: i64) -> Self {
        Order {
            trader,
            price: Cell::new(price),
            size: Cell::new(size),
        }
    }
}

const TRADER: usize = 1;
const PRICE: usize = 2;
const SIZE: usize = 3;

fn print_rows(view: &ViewAdapter<VecRecordStore<Order>>) {
    let mut total_size = 0;
    for row in 0..view.row_count() {
        total_size += view.get_value(SIZE, row).as_i64().unwrap_or(0);
        println!(
            "   {:>3}  {:<6} {:>8} {:>5}",
            view.get_value(0, row),
            view.get_value(TRADER, row),
            view.get_value(PRICE, row),
            view.get_value(SIZE, row)
        );
    }
    println!("   {} rows, {} lots\n", view.row_count(), total_size);
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    println!("=== LiveGrid Order Book Example ===\n");

    // 1. Create the store and the view
    println!("1. Creating order book...");
    let store = Rc::new(RefCell::new(VecRecordStore::from_records(vec![
        Order::new("alice", 101.5, 200),
        Order::new("bob", 100.0, 50),
        Order::new("carol", 102.25, 10),
        Order::new("dave", 99.75, 500),
        Order::new("erin", 101.0, 0),
    ])));

    let fields = vec![
        Field::row_number("#"),
        Field::new("trader")
            .with_value(|o: &Order| FieldValue::String(o.trader.to_string()))
            .ordered_by_value(),
        Field::new("price")
            .with_value(|o: &Order| FieldValue::Float64(o.price.get()))
            .ordered_by_value(),
        Field::new("size")
            .with_value(|o: &Order| FieldValue::Int64(o.size.get()))
            .ordered_by_value(),
    ];

    let mut view = ViewAdapter::new(store.clone(), fields, ViewConfig::default())
        .expect("default config is valid");
    let recorder = EventRecorder::new();
    let events = recorder.log();
    view.set_listener(Box::new(recorder));
    println!("   {} orders\n", view.row_count());

    // 2. Best price first, hide empty orders
    println!("2. Sorting by price descending, hiding empty orders...");
    view.sort_by_many(&[SortFieldSpecifier::descending(PRICE), SortFieldSpecifier::ascending(TRADER)]);
    view.set_filter(Some(Box::new(|o: &Order| o.size.get() > 0)));
    print_rows(&view);

    // 3. A new order arrives
    println!("3. Frank bids 101.75...");
    events.borrow_mut().clear();
    let index = {
        let mut store = store.borrow_mut();
        store.push(Order::new("frank", 101.75, 75))
    };
    view.record_inserted(index, true);
    print_rows(&view);

    // 4. Dave improves his price; the row moves
    println!("4. Dave improves to 102.5...");
    store.borrow().record(3).expect("dave is record 3").price.set(102.5);
    view.invalidate_value(3, PRICE, true);
    print_rows(&view);

    // 5. Two orders fill at once
    println!("5. Alice and Carol are filled...");
    store
        .borrow_mut()
        .remove_many(&[0, 2])
        .expect("both orders exist");
    view.records_deleted(&[0, 2]);
    print_rows(&view);

    println!("   Notifications since step 3:");
    for event in events.borrow().iter() {
        match serde_json::to_string(event) {
            Ok(json) => println!("   {}", json),
            Err(e) => println!("   <unserializable event: {}>", e),
        }
    }
    println!();

    // 6. Reverse the display order
    println!("6. Reversing row order...");
    view.set_row_order_reversed(true);
    print_rows(&view);

    println!("=== Done ===");
}
