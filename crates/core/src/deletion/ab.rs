use std::ops::{Index, IndexMut, Not};

/// Selects one of two double-buffered lists, see [`ABArray`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum AB {
	#[default]
	A,
	B,
}

impl Not for AB {
	type Output = AB;

	#[inline]
	fn not(self) -> Self::Output {
		match self {
			AB::A => AB::B,
			AB::B => AB::A,
		}
	}
}

/// An `[T; 2]` that can be indexed by [`AB`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ABArray<T>([T; 2]);

impl<T> ABArray<T> {
	#[inline]
	pub fn new(mut f: impl FnMut() -> T) -> Self {
		Self([f(), f()])
	}

	/// Mutable access to both entries at once, `(self[ab], self[!ab])`.
	#[inline]
	pub fn split_mut(&mut self, ab: AB) -> (&mut T, &mut T) {
		let [a, b] = &mut self.0;
		match ab {
			AB::A => (a, b),
			AB::B => (b, a),
		}
	}

	#[inline]
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.0.iter()
	}
}

impl<T> Index<AB> for ABArray<T> {
	type Output = T;

	#[inline]
	fn index(&self, index: AB) -> &Self::Output {
		self.0.index(index as usize)
	}
}

impl<T> IndexMut<AB> for ABArray<T> {
	#[inline]
	fn index_mut(&mut self, index: AB) -> &mut Self::Output {
		self.0.index_mut(index as usize)
	}
}
