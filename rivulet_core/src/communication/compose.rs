//! Flow composition
//!
//! [`compose`] joins two stages into one: pushes enter the upstream end,
//! subscribers attach to the downstream end, and `request()` is forwarded to
//! the upstream end so a pull travels through the whole chain.

use std::rc::Rc;

use super::source::Source;
use super::traits::{Observable, Requestable, Sink};

/// Two connected stages seen as one flow
pub struct Composite<U, D> {
    upstream: Rc<U>,
    downstream: Rc<D>,
}

impl<U, D> Composite<U, D> {
    pub fn upstream(&self) -> &Rc<U> {
        &self.upstream
    }

    pub fn downstream(&self) -> &Rc<D> {
        &self.downstream
    }
}

/// Subscribe `downstream` to `upstream` and return the pair as one stage
pub fn compose<MID, U, D>(upstream: Rc<U>, downstream: Rc<D>) -> Rc<Composite<U, D>>
where
    MID: 'static,
    U: Observable<MID>,
    D: Sink<MID> + 'static,
{
    upstream.subscribe(&downstream);
    Rc::new(Composite {
        upstream,
        downstream,
    })
}

impl<IN, U, D> Sink<IN> for Composite<U, D>
where
    U: Sink<IN>,
{
    fn on_next(&self, value: &IN) {
        self.upstream.on_next(value);
    }
}

impl<OUT, U, D> Observable<OUT> for Composite<U, D>
where
    OUT: 'static,
    D: Observable<OUT>,
{
    fn source(&self) -> &Source<OUT> {
        self.downstream.source()
    }
}

impl<U, D> Requestable for Composite<U, D>
where
    U: Requestable,
{
    fn request(&self) {
        self.upstream.request();
    }
}
