//! Typed views of the integer discriminants carried inside wire records
//!
//! Records keep the raw integers so that any bit pattern written by the
//! counterparty is a valid value; conversion into these enums happens at
//! the edge and reports unknown values as [`WireError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decoding failures for wire discriminants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Discriminant outside the known set
    #[error("unknown {kind} discriminant {value}")]
    UnknownDiscriminant {
        /// Enum being decoded
        kind: &'static str,
        /// Raw value found on the wire
        value: i64,
    },
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr($repr)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $name {
            /// Raw value as laid out on the wire
            #[must_use]
            pub const fn raw(self) -> $repr {
                self as $repr
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = WireError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                match value {
                    $( v if v == $value => Ok(Self::$variant), )+
                    other => Err(WireError::UnknownDiscriminant {
                        kind: stringify!($name),
                        value: i64::from(other),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Instruction carried by a request record
    RequestType: i32 {
        NewOrder = 0,
        ModifyOrder = 1,
        CancelOrder = 2,
        OrderStatus = 3,
        SessionMsg = 4,
        Heartbeat = 5,
        OptExec = 6,
        OptExecCancel = 7,
    }
}

wire_enum! {
    OrderType: i32 {
        Limit = 1,
        Market = 2,
        WeightAvg = 3,
        ConditionalLimitPrice = 4,
        BestPrice = 5,
    }
}

wire_enum! {
    /// Time in force
    OrderDuration: i32 {
        Day = 0,
        Ioc = 1,
        Fok = 2,
        Counter = 3,
        Fak = 4,
    }
}

wire_enum! {
    PriceType: i32 {
        Percentage = 1,
        PerUnit = 2,
        Yield = 9,
    }
}

wire_enum! {
    PositionDirection: i32 {
        Open = 10,
        Close = 11,
        CloseIntraday = 12,
        PosError = 13,
    }
}

wire_enum! {
    /// Kind of response sent back by the order-routing process
    ResponseType: i32 {
        NewOrderConfirm = 0,
        NewOrderFreeze = 1,
        ModifyOrderConfirm = 2,
        CancelOrderConfirm = 3,
        TradeConfirm = 4,
        OrderError = 5,
        ModifyOrderReject = 6,
        CancelOrderReject = 7,
        OrsReject = 8,
        RmsReject = 9,
        SimReject = 10,
        BusinessReject = 11,
        ModifyOrderPending = 12,
        CancelOrderPending = 13,
        OrdersPerDayLimitReject = 14,
        OrdersPerDayLimitWarning = 15,
        OrderExpired = 16,
        StopLossWarning = 17,
        NullResponse = 18,
    }
}

wire_enum! {
    SubResponseType: i32 {
        NullResponseMiddle = 0,
        OrderRejectMiddle = 1,
        ModifyRejectMiddle = 2,
        CancelOrderRejectMiddle = 3,
    }
}

wire_enum! {
    OpenCloseType: i8 {
        Null = 0,
        Open = 1,
        Close = 2,
        CloseToday = 3,
    }
}

wire_enum! {
    /// Exchange identifier on execution reports
    TsExchangeId: i8 {
        Null = 0,
        Shfe = 1,
        Ine = 2,
        Czce = 3,
        Dce = 4,
        Cffex = 5,
        Gfex = 6,
    }
}

wire_enum! {
    /// Exchange segment code on request records
    ExchangeType: u8 {
        NseFo = 0,
        NseCm = 1,
        NseCds = 2,
        MicexFond = 3,
        MicexCurr = 4,
        Mcx = 5,
        Cme = 6,
        Lme = 7,
        Nyse = 8,
        Arca = 9,
        NotNse = 10,
        RequestMsgExchg = 11,
        ResponseMsgExchg = 12,
    }
}

wire_enum! {
    /// Exchange code on market-data headers
    MdExchange: u8 {
        Unknown = 0,
        Shfe = 57,
        Cffex = 58,
        Zce = 59,
        Dce = 60,
        Gfex = 61,
    }
}

wire_enum! {
    FeedType: u8 {
        TickByTick = b'X',
        Snapshot = b'W',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, ResponseType::NewOrderConfirm)]
    #[case(4, ResponseType::TradeConfirm)]
    #[case(7, ResponseType::CancelOrderReject)]
    #[case(9, ResponseType::RmsReject)]
    #[case(18, ResponseType::NullResponse)]
    fn test_response_type_decode(#[case] raw: i32, #[case] expected: ResponseType) {
        assert_eq!(ResponseType::try_from(raw), Ok(expected));
        assert_eq!(expected.raw(), raw);
    }

    #[test]
    fn test_unknown_discriminant_reports_kind() {
        let err = ResponseType::try_from(42).err();
        assert_eq!(
            err,
            Some(WireError::UnknownDiscriminant {
                kind: "ResponseType",
                value: 42
            })
        );
    }

    #[test]
    fn test_sparse_enums() {
        assert_eq!(PriceType::try_from(9), Ok(PriceType::Yield));
        assert!(PriceType::try_from(3).is_err());
        assert_eq!(PositionDirection::Open.raw(), 10);
        assert_eq!(MdExchange::try_from(61), Ok(MdExchange::Gfex));
        assert_eq!(FeedType::Snapshot.raw(), b'W');
        assert!(TsExchangeId::try_from(-1).is_err());
    }
}
