use alloc::{boxed::Box, collections::VecDeque};

use crate::vmm::VCpu;

pub type Handler<I> = Box<dyn FnMut(&mut dyn VCpu, &mut I) -> bool>;

/// Ordered list of exit handlers. The most recently added handler runs first
/// and the walk stops at the first one that returns `true`.
pub struct HandlerChain<I> {
    handlers: VecDeque<Handler<I>>,
}

impl<I> HandlerChain<I> {
    pub fn new() -> Self {
        Self {
            handlers: VecDeque::new(),
        }
    }

    pub fn add<F>(&mut self, handler: F)
    where
        F: FnMut(&mut dyn VCpu, &mut I) -> bool + 'static,
    {
        self.handlers.push_front(Box::new(handler));
    }

    pub fn dispatch(&mut self, vcpu: &mut dyn VCpu, info: &mut I) -> bool {
        self.handlers.iter_mut().any(|handler| handler(&mut *vcpu, &mut *info))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<I> Default for HandlerChain<I> {
    fn default() -> Self {
        Self::new()
    }
}
