//! Declarative macros for ergonomic effect construction
//!
//! Most effects in the booking workflow are a single API call whose result is
//! turned back into an action. These macros keep that boilerplate short.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use tripflow_core::async_effect;
///
/// async_effect! {
///     let result = api.allocate_flight(booking_id, request).await;
///     Some(AllocationAction::from_result(target, result))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Future` that immediately yields an action
///
/// Used to hand control to the next step of a sequential loop through the
/// store, so that every step is observable as its own action.
///
/// # Example
///
/// ```rust,ignore
/// use tripflow_core::dispatch;
///
/// dispatch!(PriceCheckAction::CheckNext { kind: ResourceKind::Flight })
/// ```
#[macro_export]
macro_rules! dispatch {
    ($action:expr) => {{
        let action = $action;
        $crate::effect::Effect::Future(::std::boxed::Box::pin(async move { Some(action) }))
    }};
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use tripflow_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: FlowAction::RefreshItinerary
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
