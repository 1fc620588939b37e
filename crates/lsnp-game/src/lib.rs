pub mod board;
pub mod tictactoe;

pub use board::{render_board, result, Outcome, WIN_LINES};
pub use tictactoe::TicTacToe;
