//! Cache Entry - 스키마 하나의 최신 유효 인스턴스
//!
//! 값과 revision은 하나의 불변 [`Snapshot`]으로 묶여 `ArcSwapOption`에
//! 통째로 교체된다. 읽기는 락 없이 포인터 하나를 읽는다.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use nexus_foundation::{Error, Result, SchemaDescriptor, SubscriptionId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Snapshot
// ============================================================================

/// 검증이 끝난 값과 그 revision
pub struct Snapshot<T> {
    value: Arc<T>,
    revision: u64,
    updated_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// 1부터 시작, 교체마다 +1
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("value", &self.value)
            .field("revision", &self.revision)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

// ============================================================================
// CacheEntry
// ============================================================================

/// 등록된 스키마 하나의 라이브 상태
pub struct CacheEntry<T> {
    descriptor: SchemaDescriptor,
    current: ArcSwapOption<Snapshot<T>>,
    /// revision 계산과 교체를 한 단계로 묶는다 (작성자끼리만 경쟁)
    install_lock: Mutex<()>,
    closed: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<T: Send + Sync + 'static> CacheEntry<T> {
    pub fn new(descriptor: SchemaDescriptor) -> Self {
        Self {
            descriptor,
            current: ArcSwapOption::empty(),
            install_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    /// 현재 값 (첫 로드 전이면 None)
    pub fn load(&self) -> Option<Arc<T>> {
        self.current.load().as_ref().map(|s| Arc::clone(&s.value))
    }

    /// 현재 스냅샷 (값 + revision을 일관되게)
    pub fn snapshot(&self) -> Option<Arc<Snapshot<T>>> {
        self.current.load_full()
    }

    /// 현재 revision (첫 로드 전이면 0)
    pub fn revision(&self) -> u64 {
        self.current.load().as_ref().map_or(0, |s| s.revision)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// 새 값 설치. 닫힌 엔트리에는 쓰지 않는다.
    pub fn install(&self, value: T) -> Result<Arc<Snapshot<T>>> {
        let _guard = self.install_lock.lock();

        if self.is_closed() {
            return Err(Error::Closed);
        }

        let revision = self.revision() + 1;
        let snapshot = Arc::new(Snapshot {
            value: Arc::new(value),
            revision,
            updated_at: Utc::now(),
        });
        self.current.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    pub fn set_subscription(&self, id: SubscriptionId) {
        *self.subscription.lock() = Some(id);
    }

    /// 구독 핸들 회수 (한 번만 반환)
    pub fn take_subscription(&self) -> Option<SubscriptionId> {
        self.subscription.lock().take()
    }

    /// 이후 install을 거부한다. 처음 닫았을 때만 true
    pub fn close(&self) -> bool {
        // install과 겹치지 않도록 같은 락 아래에서 닫는다
        let _guard = self.install_lock.lock();
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("descriptor", &self.descriptor)
            .field(
                "revision",
                &self.current.load().as_ref().map_or(0, |s| s.revision),
            )
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
