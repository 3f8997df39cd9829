/// Id-indexed storage for backend resources. Freed ids are reused.
pub(crate) struct Slab<T> {
    items: Vec<Option<T>>,
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, item: T) -> u32 {
        if let Some(i) = self.items.iter().position(Option::is_none) {
            self.items[i] = Some(item);
            return i as u32;
        }
        self.items.push(Some(item));
        (self.items.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.items.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.items.get_mut(id as usize).and_then(Option::take)
    }

    pub fn live(&self) -> usize {
        self.items.iter().filter(|i| i.is_some()).count()
    }

    /// Number of ids ever handed out, live or free.
    pub fn capacity(&self) -> usize {
        self.items.len()
    }
}
