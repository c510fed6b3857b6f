use std::sync::Arc;

use ad_selection::{
    AdvertisementContent, MemoryStore, Operator, RequestAttribute, RulePredicate,
    SelectionConfig, TargetingGroup, TargetingPredicate, WorkerPool, WorkerPoolConfig,
};

pub fn main() -> ad_selection::Result<()> {
    env_logger::init();

    // Start the worker pool once and share it between all selections.
    let pool = Arc::new(WorkerPool::start(WorkerPoolConfig::new())?);

    let store = MemoryStore::new();
    store.put_content(
        "us",
        vec![
            AdvertisementContent::new("kindle", "us", "<ad>Kindle</ad>"),
            AdvertisementContent::new("echo", "us", "<ad>Echo</ad>"),
        ],
    );

    let prime_members: Arc<dyn TargetingPredicate> = Arc::new(RulePredicate::new(
        RequestAttribute::CustomerId,
        Operator::Matches,
        "^prime-",
    ));
    store.put_targeting_groups(
        "kindle",
        vec![TargetingGroup::new("kindle", 0.12, vec![prime_members])?],
    );
    store.put_targeting_groups("echo", vec![TargetingGroup::new("echo", 0.04, vec![])?]);

    let mut config = SelectionConfig::new(store.clone(), store);
    config.selection_logger(|event: ad_selection::SelectionEvent| {
        println!("Selected: {:?}", event);
    });
    let selection = config.to_selection_logic(Arc::clone(&pool));

    for customer_id in ["prime-123", "guest-456"] {
        let advertisement = selection.select_advertisement(customer_id, "us")?;
        println!("{customer_id}: {:?}", advertisement.content());
    }

    pool.shutdown()
}
