use proptest::prelude::*;
use std::collections::BTreeSet;
use team_memo_lib::board::{SectionView, TeamBoard};

#[derive(Debug, Clone)]
enum BoardOp {
    Add,
    Delete(prop::sample::Index),
    /// Switch away and back: the same board re-receives its own rows.
    Restore,
    /// Process restart: a fresh board receives the saved rows.
    Reload,
}

fn board_op() -> impl Strategy<Value = BoardOp> {
    prop_oneof![
        4 => Just(BoardOp::Add),
        2 => any::<prop::sample::Index>().prop_map(BoardOp::Delete),
        1 => Just(BoardOp::Restore),
        1 => Just(BoardOp::Reload),
    ]
}

fn row_ids(board: &TeamBoard) -> Vec<u32> {
    board.rows().iter().map(|row| row.row_id).collect()
}

proptest! {
    #[test]
    fn row_ids_stay_pairwise_distinct(ops in prop::collection::vec(board_op(), 0..60)) {
        let mut board = TeamBoard::new();
        for op in ops {
            match op {
                BoardOp::Add => {
                    let before = row_ids(&board);
                    let added = board.add_team_row();
                    prop_assert!(before.iter().all(|id| *id < added));
                }
                BoardOp::Delete(index) => {
                    let ids = row_ids(&board);
                    if !ids.is_empty() {
                        prop_assert!(board.delete_team_row(ids[index.index(ids.len())]));
                    }
                }
                BoardOp::Restore => {
                    let rows = board.team_data();
                    board.set_team_data(&rows);
                    prop_assert_eq!(board.team_data(), rows);
                }
                BoardOp::Reload => {
                    let rows = board.team_data();
                    board = TeamBoard::new();
                    board.set_team_data(&rows);
                }
            }

            let ids = row_ids(&board);
            let distinct: BTreeSet<u32> = ids.iter().copied().collect();
            prop_assert_eq!(distinct.len(), ids.len());
        }
    }

    #[test]
    fn same_board_never_reissues_an_id(adds in 1usize..20, deletes in 0usize..20) {
        let mut board = TeamBoard::new();
        let mut issued = BTreeSet::new();
        for _ in 0..adds {
            issued.insert(board.add_team_row());
        }
        for row_id in row_ids(&board).into_iter().take(deletes) {
            board.delete_team_row(row_id);
        }
        let rows = board.team_data();
        board.set_team_data(&rows);
        prop_assert!(issued.insert(board.add_team_row()));
    }
}

#[test]
fn decoded_max_row_id_leaves_room_for_new_rows() {
    let state = team_memo_lib::codec::decode("[SECTION: A]\n  [TEAM_1]\n  ROW_ID: 4294967295\n").expect("decode");
    let mut board = TeamBoard::new();
    board.set_team_data(&state.sections["A"].teams);

    let first = board.add_team_row();
    let second = board.add_team_row();
    assert_eq!(row_ids(&board), vec![u32::MAX, first, second]);
    assert_ne!(first, second);
    assert!(first > 0 && first < u32::MAX);
}
