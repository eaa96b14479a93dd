//! The quote operation table
//!
//! Every query operation the pool can forward is listed here exactly once.
//! `with_operations!` hands the table to a callback macro, which lets the
//! client trait and the pool manager's forwarding methods be generated from
//! the same list and never drift apart.
//!
//! Arguments are owned values so a call can be replayed against a different
//! server after a failover.

macro_rules! with_operations {
    ($callback:ident) => {
        $callback! {
            /// Number of securities listed on `market`.
            fn get_security_count(market: Market) -> u32;

            /// Page of the security list starting at `start` (pages of 1000).
            fn get_security_list(market: Market, start: u32) -> Vec<SecurityInfo>;

            /// K-line bars for a security, newest `start` bars skipped.
            fn get_security_bars(
                category: BarCategory,
                market: Market,
                code: String,
                start: u16,
                count: u16
            ) -> Vec<Bar>;

            /// K-line bars for an index.
            fn get_index_bars(
                category: BarCategory,
                market: Market,
                code: String,
                start: u16,
                count: u16
            ) -> Vec<Bar>;

            /// Realtime quotes for a batch of securities.
            fn get_security_quotes(stocks: Vec<SecurityId>) -> Vec<Quote>;

            /// Intraday minute prices for today.
            fn get_minute_time_data(market: Market, code: String) -> Vec<MinuteTick>;

            /// Intraday minute prices for a past trading day (`YYYYMMDD`).
            fn get_history_minute_time_data(
                market: Market,
                code: String,
                date: u32
            ) -> Vec<MinuteTick>;

            /// Tick-by-tick transactions for today.
            fn get_transaction_data(
                market: Market,
                code: String,
                start: u32,
                count: u32
            ) -> Vec<Transaction>;

            /// Tick-by-tick transactions for a past trading day (`YYYYMMDD`).
            fn get_history_transaction_data(
                market: Market,
                code: String,
                start: u32,
                count: u32,
                date: u32
            ) -> Vec<Transaction>;

            /// Table of contents of the F10 company information files.
            fn get_company_info_category(
                market: Market,
                code: String
            ) -> Vec<CompanyInfoCategory>;

            /// One section of an F10 company information file.
            fn get_company_info_content(
                market: Market,
                code: String,
                filename: String,
                start: u32,
                length: u32
            ) -> String;

            /// Ex-dividend and ex-rights history.
            fn get_xdxr_info(market: Market, code: String) -> Vec<XdxrRecord>;

            /// Latest financial summary.
            fn get_finance_info(market: Market, code: String) -> FinanceInfo;

            /// Keep-alive round trip; returns the server's security count.
            fn do_heartbeat() -> u32;

            /// Convert result records into a column-oriented table.
            fn to_table(records: Vec<serde_json::Value>) -> Table;
        }
    };
}

pub(crate) use with_operations;
