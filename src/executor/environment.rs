use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::Value;

/// Variable cell. By-ref parameters hold a clone of the caller's `Slot`, so
/// writes through either name land in the same place.
pub type Slot = Rc<RefCell<Value>>;

#[derive(Debug, Default)]
pub struct Environment {
    globals: HashMap<String, Slot>,
    frames: Vec<HashMap<String, Slot>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks in the innermost routine frame, then in the globals.
    pub fn lookup(&self, name: &str) -> Option<Slot> {
        self.frames
            .last()
            .and_then(|frame| frame.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(name).map(|slot| slot.borrow().clone())
    }

    /// Binds `name` in the current scope, replacing any binding it had there.
    pub fn define(&mut self, name: &str, value: Value) -> Slot {
        let slot = Rc::new(RefCell::new(value));
        self.bind(name, slot.clone());
        slot
    }

    pub fn bind(&mut self, name: &str, slot: Slot) {
        let scope = match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        };
        scope.insert(name.to_string(), slot);
    }

    /// Unknown names are created in the current scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.lookup(name) {
            Some(slot) => *slot.borrow_mut() = value,
            None => {
                self.define(name, value);
            }
        }
    }

    pub fn push_frame(&mut self, frame: HashMap<String, Slot>) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }
}
