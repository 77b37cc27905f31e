//! Randomized completion-order tests for the collection barrier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use vsphere_monitor::barrier::CollectionBarrier;
use vsphere_monitor::client::mock::{MockHost, MockHypervisor, MockVm};
use vsphere_monitor::inventory::HostSelector;
use vsphere_monitor::sink::MemorySink;
use vsphere_monitor::{CollectionOrchestrator, Endpoint, RunContext};

/// Random bytes for delays and fan-out widths
fn entropy(len: usize) -> Arc<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf).unwrap();
    Arc::new(buf)
}

fn jitter(byte: u8) -> Duration {
    Duration::from_micros(u64::from(byte % 32) * 100)
}

// =============================================================================
// BARRIER ONLY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waits_for_every_dynamic_registration() {
    const HOSTS: usize = 24;

    for _round in 0..8 {
        let rand = entropy(HOSTS * 64);
        let barrier = CollectionBarrier::new();
        let completed = Arc::new(AtomicUsize::new(0));
        let expected = Arc::new(AtomicUsize::new(HOSTS));

        let me = barrier.register();
        for h in 0..HOSTS {
            let party = barrier.register();
            let rand = rand.clone();
            let completed = completed.clone();
            let expected = expected.clone();
            tokio::spawn(async move {
                let base = h * 64;
                tokio::time::sleep(jitter(rand[base])).await;

                let vms = usize::from(rand[base + 1] % 6);
                expected.fetch_add(vms, Ordering::SeqCst);
                for v in 0..vms {
                    let child = party.register_child();
                    let rand = rand.clone();
                    let completed = completed.clone();
                    let expected = expected.clone();
                    tokio::spawn(async move {
                        let byte = rand[base + 2 + v * 2];
                        tokio::time::sleep(jitter(byte)).await;
                        // Extra registration made mid-run by a child
                        if rand[base + 3 + v * 2] % 4 == 0 {
                            expected.fetch_add(1, Ordering::SeqCst);
                            let extra = child.register_child();
                            let completed = completed.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(jitter(byte.rotate_left(3))).await;
                                completed.fetch_add(1, Ordering::SeqCst);
                                drop(extra);
                            });
                        }
                        completed.fetch_add(1, Ordering::SeqCst);
                        drop(child);
                    });
                }

                completed.fetch_add(1, Ordering::SeqCst);
                drop(party);
            });
        }

        me.arrive_and_await().await;

        let expected = expected.load(Ordering::SeqCst);
        assert_eq!(completed.load(Ordering::SeqCst), expected);
        assert_eq!(barrier.arrived(), expected + 1);
        assert_eq!(barrier.registered(), expected + 1);
        assert_eq!(barrier.outstanding(), 0);
    }
}

// =============================================================================
// FULL RUN
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_publishes_after_all_tasks_arrive() {
    const HOSTS: usize = 12;
    let rand = entropy(HOSTS * 8);

    let mut hypervisor = MockHypervisor::new();
    let mut total_vms = 0;
    for h in 0..HOSTS {
        let mut host = MockHost::new(format!("esx-{h:02}")).delay(jitter(rand[h * 8]));
        let vms = usize::from(rand[h * 8 + 1] % 5);
        for v in 0..vms {
            let vm = MockVm::new(format!("vm-{h:02}-{v}")).delay(jitter(rand[h * 8 + 2 + v]));
            host = host.vm(vm);
        }
        total_vms += vms;
        hypervisor = hypervisor.host(host);
    }

    let hypervisor = Arc::new(hypervisor);
    let sink = Arc::new(MemorySink::new());
    let endpoint = Endpoint::for_host("vc", "u", SecretString::from("p".to_string()));
    let context = RunContext::new(endpoint, "Custom Metrics|vmware|Status", None)
        .with_selectors(vec![HostSelector::new("*", ["*"])])
        .with_pools(1, 2);

    let report = CollectionOrchestrator::new(hypervisor.clone(), sink.clone(), context)
        .run()
        .await
        .unwrap();

    assert_eq!(report.hosts, HOSTS);
    assert_eq!(report.vm_tasks, total_vms);
    assert_eq!(sink.publish_count(), 1);

    // heartbeat + one status per host + one status per VM; the catalog is empty
    let batch = sink.last_batch().unwrap();
    assert_eq!(batch.len(), 1 + HOSTS + total_vms);
    assert_eq!(hypervisor.calls().vm_stats(), total_vms);
}
