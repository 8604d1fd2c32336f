//! Current-session slot shared by every request of one gateway.

// crates.io
use async_lock::MutexGuard as AsyncMutexGuard;
// self
use crate::{_prelude::*, session::Session};

/// A session together with the generation it was installed under.
#[derive(Clone, Debug)]
pub(crate) struct Installed {
	pub(crate) generation: u64,
	pub(crate) session: Arc<Session>,
}

#[derive(Debug, Default)]
struct Slot {
	last_generation: u64,
	current: Option<Installed>,
}

/// Readers take a cheap snapshot under a short synchronous lock; writers (login, refresh,
/// logout) additionally serialize on an async lock so memory and store change in the same order.
#[derive(Debug, Default)]
pub(crate) struct SessionCell {
	slot: RwLock<Slot>,
	writes: AsyncMutex<()>,
}
impl SessionCell {
	pub(crate) fn new(initial: Option<Session>) -> Self {
		let cell = Self::default();

		if let Some(session) = initial {
			cell.install(session);
		}

		cell
	}

	pub(crate) fn snapshot(&self) -> Option<Installed> {
		self.slot.read().current.clone()
	}

	pub(crate) fn session(&self) -> Option<Arc<Session>> {
		self.slot.read().current.as_ref().map(|installed| installed.session.clone())
	}

	pub(crate) fn generation(&self) -> Option<u64> {
		self.slot.read().current.as_ref().map(|installed| installed.generation)
	}

	pub(crate) fn install(&self, session: Session) -> Installed {
		let mut slot = self.slot.write();

		slot.last_generation += 1;

		let installed = Installed { generation: slot.last_generation, session: Arc::new(session) };

		slot.current = Some(installed.clone());

		installed
	}

	pub(crate) fn clear(&self) -> Option<Installed> {
		self.slot.write().current.take()
	}

	pub(crate) async fn lock_writes(&self) -> AsyncMutexGuard<'_, ()> {
		self.writes.lock().await
	}
}
