//! Connection lifecycle hooks (§3 `Connection`: "on-interrupted/on-resumed/
//! on-disconnect callbacks", §4.4 FSM side effects). Held behind their own
//! mutex, separate from `Synced`, so `eventloop.rs` never has to invoke a
//! user callback while still holding the FSM lock.

use crate::error::ErrorCode;

type CompleteFn = Box<dyn FnMut(Result<(), ErrorCode>) + Send>;
type EventFn = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub struct Callbacks {
    pub on_connection_complete: Option<CompleteFn>,
    pub on_resumed: Option<EventFn>,
    pub on_interrupted: Option<EventFn>,
    pub on_disconnect: Option<EventFn>,
}

impl Callbacks {
    pub fn fire_connection_complete(&mut self, result: Result<(), ErrorCode>) {
        if let Some(cb) = &mut self.on_connection_complete {
            cb(result);
        }
    }

    pub fn fire_resumed(&mut self) {
        if let Some(cb) = &mut self.on_resumed {
            cb();
        }
    }

    pub fn fire_interrupted(&mut self) {
        if let Some(cb) = &mut self.on_interrupted {
            cb();
        }
    }

    pub fn fire_disconnect(&mut self) {
        if let Some(cb) = &mut self.on_disconnect {
            cb();
        }
    }
}
