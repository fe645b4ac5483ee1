//! End-to-end lineage extraction over real T-SQL text.

mod common;

use common::{column, edges_between, expect_edge, incoming, run, run_with_schema};
use rstest::rstest;
use traceline_core::{
    ColumnSpec, EdgeType, NodeData, NodeKind, StaticMetadata, TableKind, TableSchema,
};

#[test]
fn simple_select_produces_direct_edges() {
    let report = run("SELECT a, b FROM T1");
    let graph = &report.graph;

    let t1 = graph.get_table("T1").expect("T1");
    assert_eq!(graph.get_node(t1).unwrap().table_kind(), Some(TableKind::BaseTable));
    let result = graph.get_table("Result").expect("Result");
    assert_eq!(
        graph.get_node(result).unwrap().table_kind(),
        Some(TableKind::ResultSet)
    );

    let edge = expect_edge(
        graph,
        column(graph, "T1", "a"),
        column(graph, "Result", "a"),
        EdgeType::Direct,
    );
    assert_eq!(edge.operation.as_ref(), "SELECT");
    expect_edge(
        graph,
        column(graph, "T1", "b"),
        column(graph, "Result", "b"),
        EdgeType::Direct,
    );
    assert_eq!(report.graph.edge_count(), 2);
}

#[test]
fn insert_select_pairs_positionally_and_through_expressions() {
    let report = run("INSERT INTO #X (c1, c2) SELECT a, a + b FROM T1");
    let graph = &report.graph;

    let x = graph.get_table("#X").expect("#X");
    assert_eq!(graph.get_node(x).unwrap().table_kind(), Some(TableKind::TempTable));

    // Bare column: direct positional edge.
    let edge = expect_edge(
        graph,
        column(graph, "T1", "a"),
        column(graph, "#X", "c1"),
        EdgeType::Direct,
    );
    assert_eq!(edge.operation.as_ref(), "INSERT");

    // Expression column: sources feed the expression, the expression feeds
    // the target indirectly.
    let c2_in = incoming(graph, column(graph, "#X", "c2"));
    assert_eq!(c2_in.len(), 1);
    let via = c2_in[0].clone();
    assert_eq!(via.edge_type, EdgeType::Indirect);
    assert_eq!(via.operation.as_ref(), "INSERT");
    let expr = via.source_id;
    assert_eq!(graph.get_node(expr).unwrap().kind, NodeKind::Expression);
    let expr_in = incoming(graph, expr);
    assert_eq!(expr_in.len(), 2);
    assert!(expr_in.iter().all(|e| e.edge_type == EdgeType::Indirect));
}

#[test]
fn insert_values_produces_no_lineage_edges() {
    let report = run("INSERT INTO T (a, b) VALUES (1, 2)");
    assert_eq!(report.graph.edge_count(), 0);
    assert!(report.graph.get_table("T").is_some());
}

#[test]
fn insert_name_matching_fallback_covers_unpaired_columns() {
    // Two target columns, one select element: the second target column is
    // matched by name against the source table.
    let report = run(
        "CREATE TABLE #Stage (a INT, b INT);\n\
         INSERT INTO #Stage (a, b) SELECT a FROM Source",
    );
    let graph = &report.graph;

    expect_edge(
        graph,
        column(graph, "Source", "a"),
        column(graph, "#Stage", "a"),
        EdgeType::Direct,
    );
    // b was never paired positionally; the fallback needs a source column
    // of the same name, which Source does not have, so b stays unfed.
    assert!(incoming(graph, column(graph, "#Stage", "b")).is_empty());
}

#[test]
fn insert_name_matching_fallback_matches_case_insensitively() {
    let schema = StaticMetadata::new(vec![TableSchema {
        name: "Source".into(),
        columns: vec![ColumnSpec::typed("A", "int"), ColumnSpec::typed("B", "int")],
    }]);
    let report = run_with_schema(
        "CREATE TABLE #Stage (a INT, b INT);\n\
         INSERT INTO #Stage SELECT * FROM Source",
        &schema,
    );
    let graph = &report.graph;
    expect_edge(
        graph,
        column(graph, "Source", "A"),
        column(graph, "#Stage", "a"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "Source", "B"),
        column(graph, "#Stage", "b"),
        EdgeType::Direct,
    );
}

#[test]
fn cte_owns_its_columns_and_feeds_the_result() {
    let report = run("WITH C AS (SELECT x, y FROM T) SELECT x FROM C");
    let graph = &report.graph;

    let c = graph.get_table("C").expect("C");
    assert_eq!(graph.get_node(c).unwrap().table_kind(), Some(TableKind::Cte));

    expect_edge(
        graph,
        column(graph, "T", "x"),
        column(graph, "C", "x"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "T", "y"),
        column(graph, "C", "y"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "C", "x"),
        column(graph, "Result", "x"),
        EdgeType::Direct,
    );
}

#[test]
fn recursive_cte_forms_a_cycle_and_path_search_terminates() {
    let report = run(
        "WITH C AS (SELECT x FROM Seed UNION ALL SELECT x FROM C WHERE x < 10) \
         SELECT x FROM C",
    );
    let graph = &report.graph;

    let cx = column(graph, "C", "x");
    // The recursive branch feeds C.x from itself.
    assert!(edges_between(graph, cx, cx)
        .iter()
        .any(|edge| edge.edge_type == EdgeType::Direct));

    let seed = column(graph, "Seed", "x");
    let result = column(graph, "Result", "x");
    let paths = graph.find_paths(seed, result, 8);
    assert!(!paths.is_empty());
}

#[test]
fn case_expression_labels_condition_result_and_else() {
    let report = run("SELECT CASE WHEN a > 0 THEN b ELSE c END AS v FROM T");
    let graph = &report.graph;

    let v = column(graph, "Result", "v");
    let v_in = incoming(graph, v);
    assert_eq!(v_in.len(), 1);
    let case_edge = &v_in[0];
    assert_eq!(case_edge.edge_type, EdgeType::Direct);
    assert_eq!(case_edge.operation.as_ref(), "CASE");

    let expr = case_edge.source_id;
    let ops: Vec<(String, String)> = incoming(graph, expr)
        .into_iter()
        .map(|edge| {
            let source = graph.get_node(edge.source_id).unwrap();
            (source.name.to_string(), edge.operation.to_string())
        })
        .collect();
    assert!(ops.contains(&("a".to_string(), "case_condition".to_string())));
    assert!(ops.contains(&("b".to_string(), "case_result".to_string())));
    assert!(ops.contains(&("c".to_string(), "case_else".to_string())));
}

#[test]
fn coalesce_and_nullif_get_argument_labels() {
    let report = run("SELECT COALESCE(a, b) AS x, NULLIF(c, d) AS y FROM T");
    let graph = &report.graph;

    let x_in = incoming(graph, column(graph, "Result", "x"));
    assert_eq!(x_in[0].operation.as_ref(), "COALESCE");
    let coalesce_ops: Vec<String> = incoming(graph, x_in[0].source_id)
        .into_iter()
        .map(|edge| edge.operation.to_string())
        .collect();
    assert_eq!(coalesce_ops, vec!["coalesce_arg", "coalesce_arg"]);

    let y_in = incoming(graph, column(graph, "Result", "y"));
    assert_eq!(y_in[0].operation.as_ref(), "NULLIF");
    let nullif_ops: Vec<String> = incoming(graph, y_in[0].source_id)
        .into_iter()
        .map(|edge| edge.operation.to_string())
        .collect();
    assert_eq!(nullif_ops, vec!["nullif_first", "nullif_second"]);
}

#[test]
fn window_function_links_partition_and_order() {
    let report = run(
        "SELECT SUM(amount) OVER (PARTITION BY region ORDER BY month) AS running FROM Sales",
    );
    let graph = &report.graph;

    let running_in = incoming(graph, column(graph, "Result", "running"));
    assert_eq!(running_in.len(), 1);
    let expr = running_in[0].source_id;
    let node = graph.get_node(expr).unwrap();
    assert_eq!(
        node.metadata.get("isWindowFunction"),
        Some(&serde_json::Value::Bool(true))
    );
    assert!(node.metadata.contains_key("windowDefinition"));

    let ops: Vec<(String, String)> = incoming(graph, expr)
        .into_iter()
        .map(|edge| {
            let source = graph.get_node(edge.source_id).unwrap();
            (source.name.to_string(), edge.operation.to_string())
        })
        .collect();
    assert!(ops.contains(&("amount".to_string(), "SUM".to_string())));
    assert!(ops.contains(&("region".to_string(), "partition".to_string())));
    assert!(ops.contains(&("month".to_string(), "order".to_string())));
}

#[test]
fn join_on_equality_produces_bidirectional_join_edges() {
    let report = run("SELECT a FROM T1 JOIN T2 ON T1.x = T2.x");
    let graph = &report.graph;

    let t1x = column(graph, "T1", "x");
    let t2x = column(graph, "T2", "x");
    let forward = expect_edge(graph, t1x, t2x, EdgeType::Join);
    let backward = expect_edge(graph, t2x, t1x, EdgeType::Join);
    assert_eq!(forward.operation.as_ref(), "INNER JOIN");
    assert_eq!(backward.operation.as_ref(), "INNER JOIN");
}

#[rstest]
#[case("JOIN", "INNER JOIN")]
#[case("INNER JOIN", "INNER JOIN")]
#[case("LEFT JOIN", "LEFT JOIN")]
#[case("RIGHT JOIN", "RIGHT JOIN")]
#[case("FULL OUTER JOIN", "FULL JOIN")]
fn join_kinds_label_their_edges(#[case] join: &str, #[case] label: &str) {
    let report = run(&format!("SELECT a FROM T1 {join} T2 ON T1.x = T2.y"));
    let graph = &report.graph;
    let edge = expect_edge(
        graph,
        column(graph, "T1", "x"),
        column(graph, "T2", "y"),
        EdgeType::Join,
    );
    assert_eq!(edge.operation.as_ref(), label);
}

#[test]
fn cte_alias_columns_rename_outputs() {
    let report = run("WITH C (a, b) AS (SELECT x, y FROM T) SELECT a FROM C");
    let graph = &report.graph;

    expect_edge(
        graph,
        column(graph, "C", "x"),
        column(graph, "C", "a"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "C", "a"),
        column(graph, "Result", "a"),
        EdgeType::Direct,
    );
    let source = column(graph, "T", "x");
    let sink = column(graph, "Result", "a");
    assert!(!graph.find_paths(source, sink, 4).is_empty());
}

#[test]
fn where_clause_emits_filter_edges_into_a_predicate_node() {
    let report = run("SELECT a FROM T WHERE b > 5 AND c = 'x'");
    let graph = &report.graph;

    let b = column(graph, "T", "b");
    let filter_edges: Vec<_> = graph
        .out_edges(b)
        .into_iter()
        .filter_map(|id| graph.get_edge(id).ok())
        .filter(|edge| edge.edge_type == EdgeType::Filter)
        .collect();
    assert_eq!(filter_edges.len(), 1);
    assert_eq!(filter_edges[0].operation.as_ref(), "WHERE");
    let predicate = graph.get_node(filter_edges[0].target_id).unwrap();
    assert_eq!(predicate.kind, NodeKind::Expression);
}

#[test]
fn group_by_emits_group_by_edges() {
    let report = run("SELECT region, SUM(amount) AS total FROM Sales GROUP BY region");
    let graph = &report.graph;

    let region = column(graph, "Sales", "region");
    let grouping: Vec<_> = graph
        .out_edges(region)
        .into_iter()
        .filter_map(|id| graph.get_edge(id).ok())
        .filter(|edge| edge.edge_type == EdgeType::GroupBy)
        .collect();
    assert_eq!(grouping.len(), 1);
    assert_eq!(grouping[0].operation.as_ref(), "GROUP BY");
}

#[test]
fn select_into_routes_outputs_to_the_temp_table() {
    let report = run("SELECT a, b INTO #Snapshot FROM T");
    let graph = &report.graph;

    let snapshot = graph.get_table("#Snapshot").expect("#Snapshot");
    assert_eq!(
        graph.get_node(snapshot).unwrap().table_kind(),
        Some(TableKind::TempTable)
    );
    expect_edge(
        graph,
        column(graph, "T", "a"),
        column(graph, "#Snapshot", "a"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "T", "b"),
        column(graph, "#Snapshot", "b"),
        EdgeType::Direct,
    );
    assert!(graph.get_column("Result", "a").is_none());
}

#[test]
fn create_temp_table_registers_declared_columns() {
    let report = run("CREATE TABLE #Work (id INT NOT NULL, note VARCHAR(100))");
    let graph = &report.graph;
    let work = graph.get_table("#Work").expect("#Work");
    let node = graph.get_node(work).unwrap();
    assert_eq!(node.table_kind(), Some(TableKind::TempTable));
    assert_eq!(node.columns().len(), 2);

    let id = graph.get_node(column(graph, "#Work", "id")).unwrap();
    match id.data {
        NodeData::Column {
            ref data_type,
            is_nullable,
            ..
        } => {
            assert_eq!(data_type.as_ref(), "INT");
            assert!(!is_nullable);
        }
        _ => panic!("expected a column node"),
    }
}

#[test]
fn update_from_second_table_is_tracked() {
    let report = run(
        "UPDATE Customers SET name = u.name, tier = UPPER(u.tier) \
         FROM Updates u WHERE Customers.id = u.id",
    );
    let graph = &report.graph;

    let direct = expect_edge(
        graph,
        column(graph, "Updates", "name"),
        column(graph, "Customers", "name"),
        EdgeType::Direct,
    );
    assert_eq!(direct.operation.as_ref(), "UPDATE");

    let tier_in = incoming(graph, column(graph, "Customers", "tier"));
    assert_eq!(tier_in.len(), 1);
    assert_eq!(tier_in[0].edge_type, EdgeType::Indirect);
    assert_eq!(tier_in[0].operation.as_ref(), "UPDATE");
}

#[test]
fn derived_table_mediates_column_flow() {
    let report = run("SELECT d.total FROM (SELECT SUM(amount) AS total FROM Payments) d");
    let graph = &report.graph;

    let d = graph.get_table("d").expect("derived table d");
    assert_eq!(
        graph.get_node(d).unwrap().table_kind(),
        Some(TableKind::DerivedTable)
    );
    let total_in = incoming(graph, column(graph, "d", "total"));
    assert_eq!(total_in.len(), 1);
    let amount = column(graph, "Payments", "amount");
    let paths = graph.find_paths(amount, column(graph, "Result", "total"), 4);
    assert!(!paths.is_empty());
}

#[test]
fn union_branches_feed_the_same_result_columns() {
    let report = run("SELECT id FROM Users UNION ALL SELECT id FROM Admins");
    let graph = &report.graph;
    let result_id = column(graph, "Result", "id");
    let sources: Vec<String> = incoming(graph, result_id)
        .into_iter()
        .map(|edge| {
            graph
                .get_node(edge.source_id)
                .unwrap()
                .table_owner()
                .unwrap()
                .to_string()
        })
        .collect();
    assert!(sources.contains(&"Users".to_string()));
    assert!(sources.contains(&"Admins".to_string()));
}

#[test]
fn pivot_synthesizes_output_columns() {
    let report = run(
        "SELECT p.ProductID, [2022], [2023] \
         FROM (SELECT ProductID, Year, SalesAmount FROM S) x \
         PIVOT (SUM(SalesAmount) FOR Year IN ([2022], [2023])) p",
    );
    let graph = &report.graph;

    for year in ["2022", "2023"] {
        let output = column(graph, "p", year);
        let ops: Vec<(String, String)> = incoming(graph, output)
            .into_iter()
            .map(|edge| {
                let node = graph.get_node(edge.source_id).unwrap();
                (node.name.to_string(), edge.operation.to_string())
            })
            .collect();
        assert!(
            ops.contains(&("Year".to_string(), "PIVOT".to_string())),
            "pivot key should feed {year}: {ops:?}"
        );
        assert!(
            ops.contains(&("SalesAmount".to_string(), "PIVOT".to_string())),
            "aggregate argument should feed {year}: {ops:?}"
        );
    }

    // The pivot key chain reaches back to the base table.
    let source_year = column(graph, "S", "Year");
    let paths = graph.find_paths(source_year, column(graph, "p", "2022"), 4);
    assert!(!paths.is_empty());
}

#[test]
fn unpivot_feeds_value_and_name_columns() {
    let report = run(
        "SELECT Product, Quarter, Amount FROM Sales \
         UNPIVOT (Amount FOR Quarter IN (Q1, Q2, Q3)) u",
    );
    let graph = &report.graph;

    let amount = column(graph, "u", "Amount");
    let quarter = column(graph, "u", "Quarter");
    for source_name in ["Q1", "Q2", "Q3"] {
        let source = column(graph, "Sales", source_name);
        assert!(!edges_between(graph, source, amount).is_empty());
        assert!(!edges_between(graph, source, quarter).is_empty());
    }
}

#[test]
fn cross_apply_correlates_left_and_right_columns() {
    let report = run(
        "SELECT o.id, t.total FROM Orders o CROSS APPLY \
         (SELECT SUM(amount) AS total FROM Items i WHERE i.order_id = o.id) t",
    );
    let graph = &report.graph;

    let edge = expect_edge(
        graph,
        column(graph, "Orders", "id"),
        column(graph, "Items", "order_id"),
        EdgeType::Join,
    );
    assert_eq!(edge.operation.as_ref(), "CROSS APPLY");
    assert!(graph.get_column("t", "total").is_some());
}

#[test]
fn procedure_parameters_flow_through_the_body() {
    let report = run(
        "CREATE PROCEDURE p (@id INT, @tot INT) AS BEGIN \
         SELECT @tot = COUNT(O.id) FROM Orders O WHERE O.cid = @id END",
    );
    let graph = &report.graph;

    let holder = graph.get_table("p").expect("parameter holder");
    let params = graph.get_node(holder).unwrap().columns().len();
    assert_eq!(params, 2);

    // @tot is assigned from the COUNT expression.
    let tot = column(graph, "p", "@tot");
    let tot_in = incoming(graph, tot);
    assert_eq!(tot_in.len(), 1);
    assert_eq!(tot_in[0].operation.as_ref(), "SET");
    assert_eq!(tot_in[0].edge_type, EdgeType::Direct);
    let count_expr = tot_in[0].source_id;
    let count_in = incoming(graph, count_expr);
    assert!(count_in
        .iter()
        .any(|edge| graph.get_node(edge.source_id).unwrap().name.as_ref() == "id"));

    // @id filters Orders.cid.
    let id_param = column(graph, "p", "@id");
    let cid = column(graph, "Orders", "cid");
    let filter = edges_between(graph, id_param, cid);
    assert!(filter
        .iter()
        .any(|edge| edge.edge_type == EdgeType::Indirect && edge.operation.as_ref() == "Filter"));
}

#[test]
fn set_variable_tracks_sources() {
    let report = run("DECLARE @v INT; SELECT @v = amount FROM Payments");
    let graph = &report.graph;
    let v = column(graph, "Variables", "@v");
    let edge = expect_edge(graph, column(graph, "Payments", "amount"), v, EdgeType::Direct);
    assert_eq!(edge.operation.as_ref(), "SET");
}

#[test]
fn temp_tables_persist_across_statements() {
    let report = run(
        "SELECT a, b INTO #Stage FROM Source;\n\
         SELECT a FROM #Stage",
    );
    let graph = &report.graph;
    expect_edge(
        graph,
        column(graph, "#Stage", "a"),
        column(graph, "Result", "a"),
        EdgeType::Direct,
    );
}

#[test]
fn create_view_owns_its_output_columns() {
    let report = run("CREATE VIEW v_totals AS SELECT region, amount FROM Sales");
    let graph = &report.graph;
    let view = graph.get_table("v_totals").expect("view");
    assert_eq!(graph.get_node(view).unwrap().table_kind(), Some(TableKind::View));
    expect_edge(
        graph,
        column(graph, "Sales", "region"),
        column(graph, "v_totals", "region"),
        EdgeType::Direct,
    );
}

#[test]
fn wildcard_expansion_uses_schema_metadata() {
    let schema = StaticMetadata::new(vec![TableSchema {
        name: "Orders".into(),
        columns: vec![
            ColumnSpec::typed("id", "int"),
            ColumnSpec::typed("total", "money"),
        ],
    }]);
    let report = run_with_schema("SELECT * FROM Orders", &schema);
    let graph = &report.graph;
    expect_edge(
        graph,
        column(graph, "Orders", "id"),
        column(graph, "Result", "id"),
        EdgeType::Direct,
    );
    expect_edge(
        graph,
        column(graph, "Orders", "total"),
        column(graph, "Result", "total"),
        EdgeType::Direct,
    );
}

#[test]
fn unknown_column_gets_a_placeholder() {
    let report = run("SELECT mystery FROM A, B");
    let graph = &report.graph;
    // Two tables in scope and no metadata: the reference is unresolvable.
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.code == "UNRESOLVED_REFERENCE"));
    let placeholder = column(graph, "Unknown", "mystery");
    let node = graph.get_node(placeholder).unwrap();
    match node.data {
        NodeData::Column { ref data_type, .. } => assert_eq!(data_type.as_ref(), "unknown"),
        _ => panic!("expected a column"),
    }
}
