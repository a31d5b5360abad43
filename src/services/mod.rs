pub mod http_search;
