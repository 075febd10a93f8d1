//! The bidirectional event pipeline.
//!
//! A pipeline owns an ordered list of [`Policy`] nodes. Index 0 sits next to
//! the application; the last index is the terminal transport adapter.
//! Outbound events walk the list forward, inbound events walk it backward,
//! and an inbound event that passes index 0 is delivered to the application
//! sink.
//!
//! One mutex serializes all traffic: a traversal never observes another
//! traversal in flight, and events a handler posts via
//! [`PolicyContext::send_outbound`] / [`PolicyContext::send_inbound`] are
//! queued and drained FIFO under the same lock before the triggering post
//! returns. Handlers therefore never run re-entrantly.

use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec::Vec;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::event::{ErrorReport, EventKind, PipelineEvent};
use crate::platform::{Platform, PlatformTimer};

/// What a handler did with an event.
#[derive(Debug)]
pub enum Flow<E> {
    /// Pass the (possibly replaced) event to the neighboring policy.
    Forward(E),
    /// The event was consumed; the traversal stops here.
    Handled,
}

/// A node in the pipeline.
///
/// Outbound and inbound handlers do local work, then either forward the
/// event or consume it. Additional events may be posted through the
/// [`PolicyContext`]; they run after the current traversal completes.
pub trait Policy<E: PipelineEvent>: Send {
    /// Invoked once, under the pipeline lock, when the pipeline is built.
    fn on_attach(&mut self, cx: &mut PolicyContext<'_, E>) -> Result<()> {
        let _ = cx;
        Ok(())
    }

    /// Handles an application-bound-for-transport event.
    fn on_outbound(&mut self, cx: &mut PolicyContext<'_, E>, event: E) -> Result<Flow<E>>;

    /// Handles a transport-bound-for-application event.
    fn on_inbound(&mut self, cx: &mut PolicyContext<'_, E>, event: E) -> Result<Flow<E>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Outbound,
    Inbound,
}

struct Posted<E> {
    direction: Direction,
    /// Index of the posting policy; `None` for external posts.
    from: Option<usize>,
    event: E,
}

/// Identifies a pipeline timer inside TIMEOUT events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Handler-side view of the pipeline during a traversal.
pub struct PolicyContext<'a, E: PipelineEvent> {
    shared: &'a Arc<PipelineShared<E>>,
    queue: &'a mut VecDeque<Posted<E>>,
    index: usize,
}

impl<E: PipelineEvent> core::fmt::Debug for PolicyContext<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyContext")
            .field("index", &self.index)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl<E: PipelineEvent> PolicyContext<'_, E> {
    /// The host platform port.
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.shared.platform
    }

    /// Shorthand for the platform clock.
    pub fn clock_msec(&self) -> i64 {
        self.shared.platform.clock_msec()
    }

    /// Queues `event` to travel outbound from this policy's outbound
    /// neighbor once the current traversal completes.
    pub fn send_outbound(&mut self, event: E) {
        self.queue.push_back(Posted {
            direction: Direction::Outbound,
            from: Some(self.index),
            event,
        });
    }

    /// Queues `event` to travel inbound from this policy's inbound neighbor
    /// once the current traversal completes.
    pub fn send_inbound(&mut self, event: E) {
        self.queue.push_back(Posted {
            direction: Direction::Inbound,
            from: Some(self.index),
            event,
        });
    }

    /// Creates a timer whose expiry posts TIMEOUT outbound on this pipeline.
    pub fn create_timer(&self) -> PipelineTimer<E> {
        PipelineTimer::new(Arc::clone(self.shared))
    }

    /// Invokes the platform critical-error hook. Never returns.
    pub fn critical_error(&self) -> ! {
        self.shared.platform.critical_error()
    }
}

struct Inner<E: PipelineEvent> {
    policies: Vec<Box<dyn Policy<E>>>,
    sink: Box<dyn FnMut(E) + Send>,
}

struct PipelineShared<E: PipelineEvent> {
    platform: Arc<dyn Platform>,
    inner: Mutex<Inner<E>>,
    timer_seq: AtomicU64,
}

/// A bidirectional, mutex-serialized event pipeline.
pub struct Pipeline<E: PipelineEvent> {
    shared: Arc<PipelineShared<E>>,
}

impl<E: PipelineEvent> core::fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl<E: PipelineEvent> Clone for Pipeline<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: PipelineEvent> Pipeline<E> {
    /// Builds a pipeline over `policies` (index 0 application-most) and
    /// attaches each policy. Inbound events that pass index 0 are delivered
    /// to `sink`.
    pub fn new(
        platform: Arc<dyn Platform>,
        policies: Vec<Box<dyn Policy<E>>>,
        sink: impl FnMut(E) + Send + 'static,
    ) -> Result<Self> {
        let shared = Arc::new(PipelineShared {
            platform,
            inner: Mutex::new(Inner {
                policies,
                sink: Box::new(sink),
            }),
            timer_seq: AtomicU64::new(0),
        });

        {
            let mut inner = shared.inner.lock();
            let mut queue = VecDeque::new();
            for index in 0..inner.policies.len() {
                let mut cx = PolicyContext {
                    shared: &shared,
                    queue: &mut queue,
                    index,
                };
                inner.policies[index].on_attach(&mut cx)?;
            }
            drain(&shared, &mut inner, &mut queue)?;
        }

        Ok(Self { shared })
    }

    /// The platform this pipeline was built with.
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.shared.platform
    }

    /// Sends `event` from the application toward the transport.
    pub fn post_outbound(&self, event: E) -> Result<()> {
        post(
            &self.shared,
            Posted {
                direction: Direction::Outbound,
                from: None,
                event,
            },
        )
    }

    /// Sends `event` from the transport toward the application.
    pub fn post_inbound(&self, event: E) -> Result<()> {
        post(
            &self.shared,
            Posted {
                direction: Direction::Inbound,
                from: None,
                event,
            },
        )
    }

    /// Creates a timer bound to this pipeline. Expiry posts TIMEOUT
    /// outbound; if that fails, ERROR inbound; if that also fails, the
    /// critical-error hook runs.
    pub fn create_timer(&self) -> PipelineTimer<E> {
        PipelineTimer::new(Arc::clone(&self.shared))
    }
}

fn post<E: PipelineEvent>(shared: &Arc<PipelineShared<E>>, first: Posted<E>) -> Result<()> {
    let mut inner = shared.inner.lock();
    let mut queue = VecDeque::new();
    let result = traverse(shared, &mut inner, &mut queue, first);
    let drain_result = drain(shared, &mut inner, &mut queue);
    result.and(drain_result)
}

/// Runs queued handler-posted events to completion. A failing deferred
/// traversal is reported as an ERROR event toward the application; if that
/// delivery fails too, the platform's critical-error hook fires.
fn drain<E: PipelineEvent>(
    shared: &Arc<PipelineShared<E>>,
    inner: &mut Inner<E>,
    queue: &mut VecDeque<Posted<E>>,
) -> Result<()> {
    while let Some(posted) = queue.pop_front() {
        let origin = posted.event.kind();
        if let Err(error) = traverse(shared, inner, queue, posted) {
            let report = Posted {
                direction: Direction::Inbound,
                from: None,
                event: E::error(ErrorReport { error, origin }),
            };
            if traverse(shared, inner, queue, report).is_err() {
                shared.platform.critical_error();
            }
        }
    }
    Ok(())
}

fn traverse<E: PipelineEvent>(
    shared: &Arc<PipelineShared<E>>,
    inner: &mut Inner<E>,
    queue: &mut VecDeque<Posted<E>>,
    posted: Posted<E>,
) -> Result<()> {
    let count = inner.policies.len();
    match posted.direction {
        Direction::Outbound => {
            let start = match posted.from {
                Some(index) => index + 1,
                None => 0,
            };
            let mut event = posted.event;
            for index in start..count {
                let mut cx = PolicyContext {
                    shared,
                    queue: &mut *queue,
                    index,
                };
                match inner.policies[index].on_outbound(&mut cx, event)? {
                    Flow::Forward(next) => event = next,
                    Flow::Handled => return Ok(()),
                }
            }
            // Ran past the terminal policy without being consumed.
            Err(Error::HttpPipelineInvalidPolicy)
        }
        Direction::Inbound => {
            let mut event = posted.event;
            let start = match posted.from {
                Some(0) | None if count == 0 => {
                    (inner.sink)(event);
                    return Ok(());
                }
                Some(0) => {
                    (inner.sink)(event);
                    return Ok(());
                }
                Some(index) => index - 1,
                None => count - 1,
            };
            let mut index = start;
            loop {
                let mut cx = PolicyContext {
                    shared,
                    queue: &mut *queue,
                    index,
                };
                let flow = match inner.policies[index].on_inbound(&mut cx, event.clone()) {
                    Ok(flow) => flow,
                    Err(error) => {
                        // Replace the failing event with an ERROR event and
                        // deliver it to the same policy; a second failure
                        // surfaces to the poster.
                        let report = E::error(ErrorReport {
                            error,
                            origin: event.kind(),
                        });
                        let mut cx = PolicyContext {
                            shared,
                            queue: &mut *queue,
                            index,
                        };
                        inner.policies[index].on_inbound(&mut cx, report)?
                    }
                };
                match flow {
                    Flow::Handled => return Ok(()),
                    Flow::Forward(next) => {
                        event = next;
                        if index == 0 {
                            (inner.sink)(event);
                            return Ok(());
                        }
                        index -= 1;
                    }
                }
            }
        }
    }
}

/// A one-shot timer owned by a policy and bound to a pipeline.
pub struct PipelineTimer<E: PipelineEvent> {
    token: TimerToken,
    shared: Arc<PipelineShared<E>>,
    active: Option<PlatformTimer>,
}

impl<E: PipelineEvent> core::fmt::Debug for PipelineTimer<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PipelineTimer")
            .field("token", &self.token)
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl<E: PipelineEvent> PipelineTimer<E> {
    fn new(shared: Arc<PipelineShared<E>>) -> Self {
        let token = TimerToken(shared.timer_seq.fetch_add(1, Ordering::Relaxed));
        Self {
            token,
            shared,
            active: None,
        }
    }

    /// The token TIMEOUT events for this timer carry.
    pub fn token(&self) -> TimerToken {
        self.token
    }

    /// Arms the timer, replacing (and cancelling) any previous schedule.
    pub fn start(&mut self, delay_msec: i64) {
        let shared = Arc::clone(&self.shared);
        let token = self.token;
        let timer = self.shared.platform.start_timer(
            delay_msec,
            Box::new(move || {
                let timeout = Posted {
                    direction: Direction::Outbound,
                    from: None,
                    event: E::timeout(token),
                };
                if let Err(error) = post(&shared, timeout) {
                    let report = Posted {
                        direction: Direction::Inbound,
                        from: None,
                        event: E::error(ErrorReport {
                            error,
                            origin: EventKind::TIMEOUT,
                        }),
                    };
                    if post(&shared, report).is_err() {
                        shared.platform.critical_error();
                    }
                }
            }),
        );
        self.active = Some(timer);
    }

    /// Cancels a pending expiry.
    pub fn stop(&mut self) {
        self.active = None;
    }
}
