use std::{
    future::Future,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{
    watch::{channel as watch_channel, Receiver, Sender},
    Semaphore,
};

use crate::CoalescionServiceConfig;

/// Value published by a leader once its work has landed, along with the
/// number of callers that shared it.
type Landed<Value> = Option<(Arc<Value>, usize)>;

/// Work currently being executed for a key
struct InFlight<Value> {
    generation: u64,
    joiners: usize,
    receiver: Receiver<Landed<Value>>,
}

enum Role<Value> {
    Leader(Sender<Landed<Value>>, u64),
    Follower(Receiver<Landed<Value>>),
}

/// Outcome of [`CoalescionService::execute`].
#[derive(Debug)]
pub struct Coalesced<Value> {
    /// Value produced by the leader, shared by every joiner
    pub value: Arc<Value>,
    /// Number of callers (leader included) that shared this execution
    pub joiners: usize,
    /// Whether this caller ran the work itself
    pub leader: bool,
}

impl<Value> Coalesced<Value> {
    /// Whether anyone besides the leader received this value
    pub fn shared(&self) -> bool {
        self.joiners > 1
    }
}

/// Runs at most one piece of work per key at a time and hands the result
/// to every caller that asked for that key while it was running.
pub struct CoalescionService<Id: Hash + Eq, Value> {
    config: Arc<CoalescionServiceConfig>,
    flights: Arc<DashMap<Id, InFlight<Value>>>,
    generations: Arc<AtomicU64>,
    permits: Option<Arc<Semaphore>>,
}

impl<Id: Hash + Eq, Value> Clone for CoalescionService<Id, Value> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            flights: self.flights.clone(),
            generations: self.generations.clone(),
            permits: self.permits.clone(),
        }
    }
}

/// Removes the in-flight entry of one generation, either once the leader
/// lands its value or when the leader is dropped half way through.
struct FlightGuard<'a, Id: Hash + Eq, Value> {
    flights: &'a DashMap<Id, InFlight<Value>>,
    id: Option<Id>,
    generation: u64,
}

impl<Id: Hash + Eq, Value> FlightGuard<'_, Id, Value> {
    /// Take the key out of the index and return the final joiner count
    fn land(mut self) -> usize {
        let generation = self.generation;
        self.id
            .take()
            .and_then(|id| {
                self.flights
                    .remove_if(&id, |_, flight| flight.generation == generation)
            })
            .map(|(_, flight)| flight.joiners)
            .unwrap_or(1)
    }
}

impl<Id: Hash + Eq, Value> Drop for FlightGuard<'_, Id, Value> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let generation = self.generation;
            self.flights
                .remove_if(&id, |_, flight| flight.generation == generation);
        }
    }
}

impl<Id: Hash + Eq + Clone, Value> CoalescionService<Id, Value> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CoalescionServiceConfig) -> Self {
        let permits = config
            .max_concurrent
            .map(|max_concurrent| Arc::new(Semaphore::new(max_concurrent.max(1))));

        Self {
            config: Arc::new(config),
            flights: Arc::new(DashMap::new()),
            generations: Arc::new(AtomicU64::new(0)),
            permits,
        }
    }

    pub fn config(&self) -> &CoalescionServiceConfig {
        &self.config
    }

    /// Register as a follower of the running execution for this key, or
    /// claim the key as leader if nothing is running.
    fn join(&self, id: &Id) -> Role<Value> {
        match self.flights.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let flight = entry.get_mut();
                flight.joiners += 1;
                Role::Follower(flight.receiver.clone())
            }
            Entry::Vacant(entry) => {
                let (send, recv) = watch_channel(None);
                let generation = self.generations.fetch_add(1, Ordering::Relaxed);

                entry.insert(InFlight {
                    generation,
                    joiners: 1,
                    receiver: recv,
                });

                Role::Leader(send, generation)
            }
        }
    }

    /// Wait for the leader to land, returns `None` if the leader went away
    async fn wait_for(&self, mut receiver: Receiver<Landed<Value>>) -> Landed<Value> {
        let landed = match receiver.wait_for(|v| v.is_some()).await {
            Ok(landed) => landed.clone(),
            Err(_) => None,
        };

        landed
    }

    async fn lead<F: FnOnce() -> Fut, Fut: Future<Output = Value>>(
        &self,
        id: Id,
        generation: u64,
        sender: Sender<Landed<Value>>,
        func: F,
    ) -> Coalesced<Value> {
        let guard = FlightGuard {
            flights: &self.flights,
            id: Some(id),
            generation,
        };

        let _permit = match self.permits.as_ref() {
            Some(permits) => permits.acquire().await.ok(),
            None => None,
        };

        let value = Arc::new(func().await);
        let joiners = guard.land();

        send_landed(&sender, value.clone(), joiners);

        Coalesced {
            value,
            joiners,
            leader: true,
        }
    }

    /// Run `func` for `id`, unless it is already running, in which case
    /// wait for that run to finish and share its value.
    pub async fn execute<F: FnOnce() -> Fut, Fut: Future<Output = Value>>(
        &self,
        id: Id,
        func: F,
    ) -> Coalesced<Value> {
        loop {
            match self.join(&id) {
                Role::Leader(sender, generation) => {
                    return self.lead(id, generation, sender, func).await
                }
                Role::Follower(receiver) => {
                    if let Some((value, joiners)) = self.wait_for(receiver).await {
                        return Coalesced {
                            value,
                            joiners,
                            leader: false,
                        };
                    }
                }
            }
        }
    }

    /// Number of keys currently being executed
    pub fn current_task_count(&self) -> usize {
        self.flights.len()
    }
}

fn send_landed<Value>(sender: &Sender<Landed<Value>>, value: Arc<Value>, joiners: usize) {
    sender.send_modify(|opt| {
        opt.replace((value, joiners));
    });
}

impl<Id: Hash + Eq + Clone, Value> Default for CoalescionService<Id, Value> {
    fn default() -> Self {
        Self::from_config(CoalescionServiceConfig::default())
    }
}
