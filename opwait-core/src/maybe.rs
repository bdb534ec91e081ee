use core::future::Future;

/// A trait representing types that may or may not require [`Send`].
///
/// Poll loops are usually driven on a multi-threaded runtime, but a caller may
/// just as well block a single thread on them. Switching the `no-send` feature
/// at compile-time drops the [`Send`] bound so futures holding `Rc` based
/// clients still satisfy the engine's trait bounds.
///
/// # Safety
///
/// Do not implement this trait directly. It is automatically implemented for all
/// types based on the feature flags.
#[cfg(not(feature = "no-send"))]
pub unsafe trait MaybeSend: Send {}

/// A trait representing types that may or may not require [`Send`].
///
/// When the `no-send` feature is enabled, this trait has no `Send` bound.
///
/// # Safety
///
/// Do not implement this trait directly. It is automatically implemented for all types.
#[cfg(feature = "no-send")]
pub unsafe trait MaybeSend {}

#[cfg(not(feature = "no-send"))]
unsafe impl<T: Send> MaybeSend for T {}
#[cfg(feature = "no-send")]
unsafe impl<T> MaybeSend for T {}

/// Same as [`MaybeSend`], but for [`Sync`].
///
/// # Safety
///
/// Do not implement this trait directly. It is automatically implemented for all
/// types based on the feature flags.
#[cfg(not(feature = "no-send"))]
pub unsafe trait MaybeSync: Sync {}

/// Same as [`MaybeSend`], but for [`Sync`].
///
/// # Safety
///
/// Do not implement this trait directly. It is automatically implemented for all types.
#[cfg(feature = "no-send")]
pub unsafe trait MaybeSync {}

#[cfg(not(feature = "no-send"))]
unsafe impl<T: Sync> MaybeSync for T {}
#[cfg(feature = "no-send")]
unsafe impl<T> MaybeSync for T {}

/// A future that may or may not be [`Send`], depending on the `no-send` feature.
pub trait MaybeSendFuture: Future + MaybeSend {}

impl<F> MaybeSendFuture for F where F: Future + MaybeSend {}
