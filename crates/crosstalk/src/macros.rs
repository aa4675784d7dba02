//! Typed client generation over the invoke-by-name primitive.

/// Generate a typed client struct over [`Peer::call`](crate::Peer::call).
///
/// Each listed method serializes its arguments with serde, invokes the
/// remote function of the same name and deserializes the result. Methods
/// without a return type expect the remote side to return `null`.
///
/// ```
/// use crosstalk::remote_client;
///
/// remote_client! {
///     /// UI-side view of the host's functions.
///     pub struct HostClient {
///         async fn add(a: i64, b: i64) -> i64;
///         async fn shutdown();
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_client {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$method_meta:meta])*
                async fn $method:ident ( $( $arg:ident : $arg_ty:ty ),* $(,)? ) $( -> $ret:ty )? ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            peer: $crate::Peer,
        }

        impl $name {
            /// Wrap a connected peer handle.
            $vis fn new(peer: $crate::Peer) -> Self {
                Self { peer }
            }

            /// The underlying peer handle, for dynamic calls and `close`.
            $vis fn peer(&self) -> &$crate::Peer {
                &self.peer
            }

            $(
                $(#[$method_meta])*
                $vis async fn $method(
                    &self
                    $(, $arg: $arg_ty)*
                ) -> ::core::result::Result<
                    $crate::remote_client!(@ret $($ret)?),
                    $crate::CallError,
                > {
                    let args = ::std::vec![
                        $(
                            $crate::serde_json::to_value($arg)
                                .map_err($crate::CallError::Serialize)?
                        ),*
                    ];
                    let ret = self.peer.call(::core::stringify!($method), args).await?;
                    $crate::serde_json::from_value(ret).map_err($crate::CallError::Deserialize)
                }
            )*
        }
    };
    (@ret) => { () };
    (@ret $ret:ty) => { $ret };
}
