//! Deduplicated key and value tables of a vector-tile layer.

use super::TileValue;
use std::collections::HashMap;

/// An append-only list with index lookup by value.
#[derive(Clone, Debug, PartialEq)]
struct DedupList<T>
where
	T: Clone + Eq + std::hash::Hash,
{
	list: Vec<T>,
	index: HashMap<T, u32>,
}

impl<T> Default for DedupList<T>
where
	T: Clone + Eq + std::hash::Hash,
{
	fn default() -> Self {
		DedupList {
			list: Vec::new(),
			index: HashMap::new(),
		}
	}
}

impl<T> DedupList<T>
where
	T: Clone + Eq + std::hash::Hash,
{
	fn from_list(list: Vec<T>) -> DedupList<T> {
		let index = list.iter().enumerate().map(|(i, e)| (e.clone(), i as u32)).collect();
		DedupList { list, index }
	}

	fn add(&mut self, entry: T) -> u32 {
		if let Some(index) = self.index.get(&entry) {
			return *index;
		}
		let index = self.list.len() as u32;
		self.index.insert(entry.clone(), index);
		self.list.push(entry);
		index
	}
}

/// The key and value tables of one layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyManager {
	keys: DedupList<String>,
	values: DedupList<TileValue>,
}

impl PropertyManager {
	pub fn new() -> PropertyManager {
		PropertyManager::default()
	}

	pub fn from_tables(keys: Vec<String>, values: Vec<TileValue>) -> PropertyManager {
		PropertyManager {
			keys: DedupList::from_list(keys),
			values: DedupList::from_list(values),
		}
	}

	pub fn add_key(&mut self, key: String) -> u32 {
		self.keys.add(key)
	}

	pub fn add_value(&mut self, value: TileValue) -> u32 {
		self.values.add(value)
	}

	pub fn iter_keys(&self) -> impl Iterator<Item = &String> + '_ {
		self.keys.list.iter()
	}

	pub fn iter_values(&self) -> impl Iterator<Item = &TileValue> + '_ {
		self.values.list.iter()
	}

	pub fn key(&self, id: u32) -> Option<&String> {
		self.keys.list.get(id as usize)
	}

	pub fn value(&self, id: u32) -> Option<&TileValue> {
		self.values.list.get(id as usize)
	}
}
