/// Ping/pong liveness across real providers
///
/// Run with: cargo test --test provider_liveness

use docsync_core::core_sync::{MemoryHub, ProtocolMessage};
use docsync_core::test_utils::{fast_provider_config, replica, wait_until};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_responsive_peer_stays_synced() {
    let hub = MemoryHub::new();
    let a = replica(&hub, "room", "doc", 0, 1, fast_provider_config());
    let b = replica(&hub, "room", "doc", 0, 2, fast_provider_config());
    a.provider.connect().await.unwrap();
    b.provider.connect().await.unwrap();

    // Ten ping periods
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(a.provider.synced_peers().await.contains_key(&b.provider.instance_id()));
    assert!(b.provider.synced_peers().await.contains_key(&a.provider.instance_id()));
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_evicted() {
    let hub = MemoryHub::new();
    let a = replica(&hub, "room", "doc", 0, 1, fast_provider_config());
    let b = replica(&hub, "room", "doc", 0, 2, fast_provider_config());
    a.provider.connect().await.unwrap();
    b.provider.connect().await.unwrap();

    let b_id = b.provider.instance_id();
    let a_ref = &a;
    assert!(
        wait_until(Duration::from_secs(1), || async move {
            a_ref.provider.synced_peers().await.contains_key(&b_id)
        })
        .await
    );

    b.provider.disconnect().await.unwrap();

    // One sweep to mark it waiting, the next to evict it
    assert!(
        wait_until(Duration::from_secs(10), || async move {
            a_ref.provider.synced_peers().await.is_empty()
        })
        .await
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_pongs_lead_to_eviction_and_rejoin() {
    let hub = MemoryHub::new();
    let a = replica(&hub, "room", "doc", 0, 1, fast_provider_config());
    let b = replica(&hub, "room", "doc", 0, 2, fast_provider_config());
    a.provider.connect().await.unwrap();
    b.provider.connect().await.unwrap();
    let b_id = b.provider.instance_id();
    let a_ref = &a;

    hub.set_drop_filter("room", move |m| {
        m.sender_id == b_id && ProtocolMessage::decode(&m.data) == Ok(ProtocolMessage::Pong)
    });
    assert!(
        wait_until(Duration::from_secs(10), || async move {
            !a_ref.provider.synced_peers().await.contains_key(&b_id)
        })
        .await
    );

    // B's next resync step 1 re-announces it
    hub.clear_drop_filter("room");
    assert!(
        wait_until(Duration::from_secs(10), || async move {
            a_ref.provider.synced_peers().await.contains_key(&b_id)
        })
        .await
    );
}
